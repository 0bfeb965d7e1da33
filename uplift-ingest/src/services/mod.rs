//! Core services: validation, registry, progress, transfer, polling, stats

pub mod poller;
pub mod progress;
pub mod registry;
pub mod remote;
pub mod stats;
pub mod transfer;
pub mod validator;

pub use poller::{PipelineStatusSource, StagePoller, StatusReport};
pub use registry::SessionRegistry;
pub use transfer::{TransferDriver, UploadSink};
pub use validator::{UploadPolicy, ValidationError};
