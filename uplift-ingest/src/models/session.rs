//! Upload session state machine
//!
//! A session progresses through
//! `Validated → Transferring → Queued → Normalizing → QualityCheck → Succeeded`
//! with an absorbing `Failed` state reachable from any non-terminal stage.
//! All mutation goes through the transition methods here; the registry
//! serializes concurrent callers per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::progress;
use uplift_common::events::PipelineStage;

/// State transition record, returned so callers can broadcast it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub session_id: Uuid,
    pub old_stage: PipelineStage,
    pub new_stage: PipelineStage,
    pub transitioned_at: DateTime<Utc>,
}

/// Filter for registry listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFilter {
    /// Sessions not yet in a terminal stage
    Active,
    /// Sessions in `Succeeded` or `Failed`
    Terminal,
}

/// One tracked file, from admission to terminal success or failure
///
/// Fields are private; the only way to change a session is through the
/// transition methods below, so the stage order and progress monotonicity
/// cannot be bypassed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Process-local unique identifier
    session_id: Uuid,

    file_name: String,
    file_size_bytes: u64,
    /// Leading-dot lowercase extension, e.g. ".csv"
    mime_extension: String,

    /// Current pipeline stage
    stage: PipelineStage,

    /// Remote pipeline identifier, assigned when the sink accepts the file
    pipeline_id: Option<String>,

    /// Bytes acknowledged by the sink in the current transfer attempt
    bytes_acknowledged: u64,

    /// Displayed completion percentage (0-100). Non-decreasing except when
    /// a new transfer attempt resets the transfer phase.
    progress_pct: u8,

    /// 1-based transfer attempt counter
    transfer_attempt: u32,

    /// Rows processed, as last reported by the pipeline status source
    rows_processed: Option<u64>,

    /// Human-readable failure reason; always present once `Failed`
    last_error: Option<String>,

    /// Consecutive status-query failures (not serialized to watchers)
    #[serde(skip)]
    poll_failures: u32,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a freshly validated session
    pub fn new(file_name: String, file_size_bytes: u64, mime_extension: String) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            file_name,
            file_size_bytes,
            mime_extension,
            stage: PipelineStage::Validated,
            pipeline_id: None,
            bytes_acknowledged: 0,
            progress_pct: 0,
            transfer_attempt: 0,
            rows_processed: None,
            last_error: None,
            poll_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_bytes
    }

    pub fn mime_extension(&self) -> &str {
        &self.mime_extension
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn pipeline_id(&self) -> Option<&str> {
        self.pipeline_id.as_deref()
    }

    pub fn bytes_acknowledged(&self) -> u64 {
        self.bytes_acknowledged
    }

    pub fn progress_pct(&self) -> u8 {
        self.progress_pct
    }

    pub fn transfer_attempt(&self) -> u32 {
        self.transfer_attempt
    }

    pub fn rows_processed(&self) -> Option<u64> {
        self.rows_processed
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Begin a transfer attempt (first or retry)
    ///
    /// Moves `Validated` into `Transferring`; resets acknowledged bytes so
    /// the new attempt starts a fresh transfer phase. Returns the 1-based
    /// attempt number, or None when the session is already terminal (e.g.
    /// cancelled between attempts).
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.is_terminal() {
            return None;
        }
        self.stage = PipelineStage::Transferring;
        self.transfer_attempt += 1;
        self.bytes_acknowledged = 0;
        self.progress_pct = 0;
        self.updated_at = Utc::now();
        Some(self.transfer_attempt)
    }

    /// Record acknowledged bytes for the current transfer attempt
    ///
    /// Ignored outside `Transferring`. Progress within one attempt is
    /// monotone; the estimator caps the transfer phase at 90%.
    pub fn record_transfer_progress(&mut self, bytes_acknowledged: u64) {
        if self.stage != PipelineStage::Transferring {
            return;
        }
        self.bytes_acknowledged = self.bytes_acknowledged.max(bytes_acknowledged);
        let pct = progress::estimate(self.stage, self.bytes_acknowledged, self.file_size_bytes);
        self.progress_pct = self.progress_pct.max(pct);
        self.updated_at = Utc::now();
    }

    /// Sink acknowledged the whole file: `Transferring → Queued`
    ///
    /// Records the sink-assigned pipeline identifier. Returns the
    /// transition, or None when the session was not transferring.
    pub fn mark_queued(&mut self, pipeline_id: String) -> Option<StageTransition> {
        if self.stage != PipelineStage::Transferring {
            return None;
        }
        self.bytes_acknowledged = self.file_size_bytes;
        self.pipeline_id = Some(pipeline_id);
        Some(self.advance_once(PipelineStage::Queued))
    }

    /// Apply a pipeline stage report from the status source
    ///
    /// Reports behind or equal to the current stage are ignored (only
    /// `rows_processed` is refreshed). Reports further ahead advance the
    /// session stepwise through intermediate stages so that the observed
    /// transition sequence always follows the defined order. The session
    /// never self-advances these stages; this is the only entry point.
    pub fn apply_stage_report(
        &mut self,
        reported: PipelineStage,
        rows_processed: Option<u64>,
    ) -> Vec<StageTransition> {
        if rows_processed.is_some() {
            self.rows_processed = rows_processed;
            self.updated_at = Utc::now();
        }
        if self.is_terminal() || reported == PipelineStage::Failed {
            // Failure reports go through `fail` with a reason
            return Vec::new();
        }
        // Pipeline tracking starts at Queued; a report can never move a
        // session that has not finished its transfer.
        if self.stage.rank() < PipelineStage::Queued.rank() {
            return Vec::new();
        }

        let mut transitions = Vec::new();
        while self.stage.rank() < reported.rank() {
            let next = match self.stage {
                PipelineStage::Queued => PipelineStage::Normalizing,
                PipelineStage::Normalizing => PipelineStage::QualityCheck,
                PipelineStage::QualityCheck => PipelineStage::Succeeded,
                _ => break,
            };
            transitions.push(self.advance_once(next));
        }
        transitions
    }

    /// Move to `Failed` with a human-readable reason
    ///
    /// No-op on a terminal session, so concurrent cancel/poll failures
    /// produce a single transition. The displayed progress retains its last
    /// value.
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<StageTransition> {
        if self.is_terminal() {
            return None;
        }
        let old_stage = self.stage;
        self.stage = PipelineStage::Failed;
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
        Some(StageTransition {
            session_id: self.session_id,
            old_stage,
            new_stage: PipelineStage::Failed,
            transitioned_at: self.updated_at,
        })
    }

    /// Count a transient status-query failure; returns the consecutive total
    pub fn note_poll_failure(&mut self) -> u32 {
        self.poll_failures += 1;
        self.poll_failures
    }

    /// A successful status query resets the consecutive failure count
    pub fn clear_poll_failures(&mut self) {
        self.poll_failures = 0;
    }

    fn advance_once(&mut self, next: PipelineStage) -> StageTransition {
        debug_assert!(next.rank() == self.stage.rank() + 1);
        let old_stage = self.stage;
        self.stage = next;
        let pct = progress::estimate(self.stage, self.bytes_acknowledged, self.file_size_bytes);
        self.progress_pct = self.progress_pct.max(pct);
        self.updated_at = Utc::now();
        StageTransition {
            session_id: self.session_id,
            old_stage,
            new_stage: next,
            transitioned_at: self.updated_at,
        }
    }

    /// True when the session matches the given listing filter
    pub fn matches(&self, filter: SessionFilter) -> bool {
        match filter {
            SessionFilter::Active => !self.is_terminal(),
            SessionFilter::Terminal => self.is_terminal(),
        }
    }
}
