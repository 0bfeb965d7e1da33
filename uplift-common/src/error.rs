//! Common error types for uplift

use thiserror::Error;

/// Common result type for uplift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the ingest service
#[derive(Error, Debug)]
pub enum Error {
    /// File rejected before admission; never enters the registry
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transfer-layer error; recoverable up to the retry bound
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Remote pipeline reported a failure; terminal immediately
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
