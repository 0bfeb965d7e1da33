//! Data models for the ingest service

mod session;
mod stats;

pub use session::{SessionFilter, StageTransition, UploadSession};
pub use stats::IngestStats;

pub use uplift_common::events::PipelineStage;
