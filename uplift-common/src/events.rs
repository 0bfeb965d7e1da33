//! Event types for the uplift event system
//!
//! Provides shared event definitions and EventBus for the ingest service.
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Remote processing pipeline stage for one upload session
///
/// Stages form a total forward order; a session only advances through this
/// order or jumps directly to `Failed`. `Failed` and `Succeeded` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Admitted by the validator, transfer not yet started
    Validated,
    /// Bytes streaming to the upload sink
    Transferring,
    /// Accepted by the sink, waiting for the remote pipeline
    Queued,
    /// Remote normalization running
    Normalizing,
    /// Remote data-quality check running
    QualityCheck,
    /// Pipeline finished successfully
    Succeeded,
    /// Terminal failure (transfer, pipeline, or cancellation)
    Failed,
}

impl PipelineStage {
    /// Position in the forward order. `Failed` ranks above every
    /// non-terminal stage so rank comparisons treat it as absorbing.
    pub fn rank(&self) -> u8 {
        match self {
            PipelineStage::Validated => 0,
            PipelineStage::Transferring => 1,
            PipelineStage::Queued => 2,
            PipelineStage::Normalizing => 3,
            PipelineStage::QualityCheck => 4,
            PipelineStage::Succeeded => 5,
            PipelineStage::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Succeeded | PipelineStage::Failed)
    }
}

/// Uplift event types
///
/// Central enum for type safety and exhaustive matching; every observable
/// change to a session is broadcast here for SSE watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpliftEvent {
    /// New session admitted and registered
    SessionRegistered {
        session_id: Uuid,
        file_name: String,
        file_size_bytes: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transfer progress update (bytes acknowledged by the upload sink)
    TransferProgress {
        session_id: Uuid,
        bytes_acknowledged: u64,
        bytes_total: u64,
        /// Displayed completion percentage (0-100, monotone per session)
        progress_pct: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session advanced to a new pipeline stage
    StageChanged {
        session_id: Uuid,
        old_stage: PipelineStage,
        new_stage: PipelineStage,
        progress_pct: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached `Succeeded`
    SessionSucceeded {
        session_id: Uuid,
        rows_processed: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached `Failed`
    SessionFailed {
        session_id: Uuid,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session removed from the registry (explicit or retention sweep)
    SessionEvicted {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl UpliftEvent {
    /// SSE event name for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            UpliftEvent::SessionRegistered { .. } => "SessionRegistered",
            UpliftEvent::TransferProgress { .. } => "TransferProgress",
            UpliftEvent::StageChanged { .. } => "StageChanged",
            UpliftEvent::SessionSucceeded { .. } => "SessionSucceeded",
            UpliftEvent::SessionFailed { .. } => "SessionFailed",
            UpliftEvent::SessionEvicted { .. } => "SessionEvicted",
        }
    }
}

/// Event bus for broadcasting uplift events
///
/// Wraps a tokio broadcast channel. Emitting never blocks; events are
/// dropped for receivers that fall behind the channel capacity.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UpliftEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<UpliftEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of receivers the event was delivered to; zero
    /// subscribers is not an error.
    pub fn emit(&self, event: UpliftEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}
