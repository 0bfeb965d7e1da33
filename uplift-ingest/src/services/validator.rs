//! Admission policy checks
//!
//! Pure size/type validation applied before a session is created. Rejected
//! files never enter the registry; the reason is surfaced synchronously to
//! the submitter.

use thiserror::Error;
use uplift_common::config::{normalize_extension, IngestConfig};

/// Validation rejection reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("exceeds size limit")]
    ExceedsSizeLimit,

    #[error("unsupported type")]
    UnsupportedType,
}

/// Size/type policy enforced at admission
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Leading-dot lowercase extensions
    pub allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_bytes: config.max_file_size_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }
}

/// Check a candidate file against the policy
///
/// The extension comparison is case-insensitive and leading-dot normalized,
/// so "CSV", "csv" and ".csv" are equivalent.
pub fn validate(
    _file_name: &str,
    size_bytes: u64,
    extension: &str,
    policy: &UploadPolicy,
) -> Result<(), ValidationError> {
    if size_bytes > policy.max_bytes {
        return Err(ValidationError::ExceedsSizeLimit);
    }
    let normalized = normalize_extension(extension);
    if !policy.allowed_extensions.iter().any(|e| *e == normalized) {
        return Err(ValidationError::UnsupportedType);
    }
    Ok(())
}

/// Extension of a file name including the leading dot, lowercased
///
/// Returns an empty string for names without an extension, which no policy
/// admits.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}
