//! Configuration loading for the ingest service
//!
//! Per-field resolution priority:
//! 1. Environment variable (`UPLIFT_*`)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing config file is not an error; the service starts on compiled
//! defaults with a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default admission policy mirrors the hosted pipeline's accepted inputs.
const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 500 * 1024 * 1024;
const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".csv", ".xlsx", ".xls", ".json", ".parquet"];
const DEFAULT_STORAGE_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MAX_TRANSFER_RETRIES: u32 = 3;
const DEFAULT_MAX_POLL_FAILURES: u32 = 5;
const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
const DEFAULT_LISTEN_PORT: u16 = 5750;

/// On-disk TOML schema; every field optional so partial files work
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub max_file_size_bytes: Option<u64>,
    pub allowed_extensions: Option<Vec<String>>,
    pub storage_limit_bytes: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_transfer_retries: Option<u32>,
    pub max_poll_failures: Option<u32>,
    pub retention_secs: Option<u64>,
    pub listen_port: Option<u16>,
    pub sink_base_url: Option<String>,
    pub status_base_url: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Validator: maximum admitted file size
    pub max_file_size_bytes: u64,
    /// Validator: admitted extensions (leading dot, lowercase)
    pub allowed_extensions: Vec<String>,
    /// Reported storage quota for the stats surface
    pub storage_limit_bytes: u64,
    /// Poller cadence
    pub poll_interval_ms: u64,
    /// Transfer attempts before a session fails
    pub max_transfer_retries: u32,
    /// Consecutive status-query failures before a session fails
    pub max_poll_failures: u32,
    /// Terminal sessions older than this are swept from the registry
    pub retention_secs: u64,
    /// HTTP listen port
    pub listen_port: u16,
    /// Upload sink base URL (remote pipeline ingress)
    pub sink_base_url: Option<String>,
    /// Pipeline status source base URL
    pub status_base_url: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            storage_limit_bytes: DEFAULT_STORAGE_LIMIT_BYTES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_transfer_retries: DEFAULT_MAX_TRANSFER_RETRIES,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            retention_secs: DEFAULT_RETENTION_SECS,
            listen_port: DEFAULT_LISTEN_PORT,
            sink_base_url: None,
            status_base_url: None,
        }
    }
}

impl IngestConfig {
    /// Load configuration using the standard resolution order
    ///
    /// Config file location: `UPLIFT_CONFIG` env var, else the platform
    /// config directory (`~/.config/uplift/config.toml` on Linux).
    pub fn load() -> Self {
        let toml = match default_config_path() {
            Some(path) if path.exists() => match load_toml(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Failed to load config file {}: {}", path.display(), e);
                    TomlConfig::default()
                }
            },
            _ => {
                warn!("No config file found, using compiled defaults");
                TomlConfig::default()
            }
        };
        Self::resolve(toml)
    }

    /// Load configuration from an explicit TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::resolve(load_toml(path)?))
    }

    /// Apply ENV > TOML > default resolution per field
    pub fn resolve(toml: TomlConfig) -> Self {
        let defaults = IngestConfig::default();
        let allowed_extensions = env_list("UPLIFT_ALLOWED_EXTENSIONS")
            .or(toml.allowed_extensions)
            .unwrap_or(defaults.allowed_extensions)
            .iter()
            .map(|e| normalize_extension(e))
            .collect();

        Self {
            max_file_size_bytes: env_parse("UPLIFT_MAX_FILE_SIZE_BYTES")
                .or(toml.max_file_size_bytes)
                .unwrap_or(defaults.max_file_size_bytes),
            allowed_extensions,
            storage_limit_bytes: env_parse("UPLIFT_STORAGE_LIMIT_BYTES")
                .or(toml.storage_limit_bytes)
                .unwrap_or(defaults.storage_limit_bytes),
            poll_interval_ms: env_parse("UPLIFT_POLL_INTERVAL_MS")
                .or(toml.poll_interval_ms)
                .unwrap_or(defaults.poll_interval_ms),
            max_transfer_retries: env_parse("UPLIFT_MAX_TRANSFER_RETRIES")
                .or(toml.max_transfer_retries)
                .unwrap_or(defaults.max_transfer_retries),
            max_poll_failures: env_parse("UPLIFT_MAX_POLL_FAILURES")
                .or(toml.max_poll_failures)
                .unwrap_or(defaults.max_poll_failures),
            retention_secs: env_parse("UPLIFT_RETENTION_SECS")
                .or(toml.retention_secs)
                .unwrap_or(defaults.retention_secs),
            listen_port: env_parse("UPLIFT_LISTEN_PORT")
                .or(toml.listen_port)
                .unwrap_or(defaults.listen_port),
            sink_base_url: std::env::var("UPLIFT_SINK_URL").ok().or(toml.sink_base_url),
            status_base_url: std::env::var("UPLIFT_STATUS_URL")
                .ok()
                .or(toml.status_base_url),
        }
    }
}

/// Normalize an extension to leading-dot lowercase form ("CSV" -> ".csv")
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

/// Config file path: `UPLIFT_CONFIG` override, else platform config dir
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("UPLIFT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("uplift").join("config.toml"))
}

fn load_toml(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name)
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
}
