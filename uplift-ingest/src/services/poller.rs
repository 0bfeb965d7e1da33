//! Pipeline stage poller
//!
//! One periodic task shared across all sessions. Each tick queries the
//! pipeline status source for every in-flight session that already has a
//! pipeline id and applies the reported stage through the registry. Query
//! errors are tolerated per session up to a consecutive-failure threshold,
//! then the session fails. The loop idles cooperatively while the registry
//! holds no non-terminal sessions and is woken by the next submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{PipelineStage, StageTransition};
use crate::services::progress;
use crate::services::registry::SessionRegistry;
use uplift_common::{EventBus, IngestConfig, Result, UpliftEvent};

/// Stage report from the pipeline status source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub stage: PipelineStage,
    #[serde(default)]
    pub rows_processed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// External system reporting the current stage for a pipeline id
#[async_trait]
pub trait PipelineStatusSource: Send + Sync {
    async fn get_status(&self, pipeline_id: &str) -> Result<StatusReport>;
}

enum TickOutcome {
    Advanced(Vec<StageTransition>),
    Failed(Option<StageTransition>, String),
    Escalated(Option<StageTransition>, String),
    Tolerated(u32),
}

/// Shared periodic stage refresher
pub struct StagePoller {
    registry: Arc<SessionRegistry>,
    source: Arc<dyn PipelineStatusSource>,
    event_bus: EventBus,
    interval: Duration,
    max_poll_failures: u32,
    retention: chrono::Duration,
    notify: Arc<Notify>,
}

impl StagePoller {
    pub fn new(
        registry: Arc<SessionRegistry>,
        source: Arc<dyn PipelineStatusSource>,
        event_bus: EventBus,
        config: &IngestConfig,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            source,
            event_bus,
            interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_failures: config.max_poll_failures.max(1),
            retention: chrono::Duration::seconds(config.retention_secs as i64),
            notify,
        }
    }

    /// Poll until cancelled
    ///
    /// Cancelling pauses stage refresh without discarding registry state;
    /// in-flight transfers are unaffected.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Stage poller started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !self.registry.has_active().await {
                tracing::debug!("No non-terminal sessions, poller idling");
                tokio::select! {
                    _ = self.notify.notified() => {}
                    // Retention applies even while every session is terminal
                    _ = tokio::time::sleep(self.interval) => {
                        self.sweep_expired().await;
                    }
                    _ = cancel.cancelled() => break,
                }
                continue;
            }
            self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("Stage poller stopped");
    }

    /// One polling pass over all pollable sessions
    pub async fn tick(&self) {
        self.sweep_expired().await;

        for session in self.registry.list(Some(crate::models::SessionFilter::Active)).await {
            // Sessions still transferring have no pipeline id yet; the
            // transfer driver owns them until the sink accepts the file.
            let Some(pipeline_id) = session.pipeline_id().map(str::to_string) else {
                continue;
            };
            let session_id = session.session_id();

            match self.source.get_status(&pipeline_id).await {
                Ok(report) => self.apply_report(session_id, report).await,
                Err(e) => self.note_failure(session_id, &pipeline_id, e).await,
            }
        }
    }

    async fn apply_report(&self, session_id: Uuid, report: StatusReport) {
        let rows_processed = report.rows_processed;
        let outcome = self
            .registry
            .update(session_id, move |s| {
                s.clear_poll_failures();
                if report.stage == PipelineStage::Failed {
                    let reason = report
                        .error
                        .unwrap_or_else(|| "pipeline reported failure".to_string());
                    TickOutcome::Failed(s.fail(reason.clone()), reason)
                } else {
                    TickOutcome::Advanced(
                        s.apply_stage_report(report.stage, report.rows_processed),
                    )
                }
            })
            .await;
        if let Some(outcome) = outcome {
            self.emit_outcome(session_id, outcome, rows_processed);
        }
    }

    async fn note_failure(&self, session_id: Uuid, pipeline_id: &str, error: uplift_common::Error) {
        let max = self.max_poll_failures;
        let outcome = self
            .registry
            .update(session_id, |s| {
                let failures = s.note_poll_failure();
                if failures >= max {
                    let reason = format!(
                        "pipeline status unavailable after {} consecutive attempts: {}",
                        failures, error
                    );
                    TickOutcome::Escalated(s.fail(reason.clone()), reason)
                } else {
                    TickOutcome::Tolerated(failures)
                }
            })
            .await;

        match outcome {
            Some(TickOutcome::Tolerated(failures)) => {
                tracing::debug!(
                    session_id = %session_id,
                    pipeline_id = %pipeline_id,
                    consecutive_failures = failures,
                    threshold = max,
                    "Transient status query failure"
                );
            }
            Some(outcome) => {
                tracing::warn!(
                    session_id = %session_id,
                    pipeline_id = %pipeline_id,
                    "Status query failures exceeded threshold"
                );
                self.emit_outcome(session_id, outcome, None);
            }
            None => {}
        }
    }

    fn emit_outcome(&self, session_id: Uuid, outcome: TickOutcome, rows_processed: Option<u64>) {
        match outcome {
            TickOutcome::Advanced(transitions) => {
                for transition in transitions {
                    tracing::info!(
                        session_id = %session_id,
                        old_stage = ?transition.old_stage,
                        new_stage = ?transition.new_stage,
                        "Pipeline stage advanced"
                    );
                    let succeeded = transition.new_stage == PipelineStage::Succeeded;
                    self.event_bus.emit(UpliftEvent::StageChanged {
                        session_id,
                        old_stage: transition.old_stage,
                        new_stage: transition.new_stage,
                        progress_pct: progress::stage_floor(transition.new_stage),
                        timestamp: transition.transitioned_at,
                    });
                    if succeeded {
                        self.event_bus.emit(UpliftEvent::SessionSucceeded {
                            session_id,
                            rows_processed,
                            timestamp: transition.transitioned_at,
                        });
                    }
                }
            }
            TickOutcome::Failed(transition, reason)
            | TickOutcome::Escalated(transition, reason) => {
                if transition.is_some() {
                    self.event_bus.emit(UpliftEvent::SessionFailed {
                        session_id,
                        error: reason,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            TickOutcome::Tolerated(_) => {}
        }
    }

    async fn sweep_expired(&self) {
        for session_id in self.registry.evict_expired(self.retention).await {
            tracing::debug!(session_id = %session_id, "Retention sweep evicted terminal session");
            self.event_bus.emit(UpliftEvent::SessionEvicted {
                session_id,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}
