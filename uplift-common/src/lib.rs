//! # Uplift Common Library
//!
//! Shared code for the uplift ingest service:
//! - Error types (`Error`, `Result`)
//! - Event types (`UpliftEvent` enum) and `EventBus`
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use events::{EventBus, UpliftEvent};
