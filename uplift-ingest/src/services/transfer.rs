//! Transfer driver
//!
//! Streams one file's bytes to the upload sink, reporting acknowledged byte
//! counts into the registry as they arrive. Transfer-layer errors are
//! retried with doubling backoff up to the configured bound; each retry is a
//! fresh transfer phase. Sink acceptance moves the session to `Queued` and
//! hands stage tracking over to the poller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::registry::SessionRegistry;
use uplift_common::{EventBus, Result, UpliftEvent};

/// External system accepting raw file bytes and issuing a pipeline id
///
/// Implementations report partial progress as cumulative acknowledged byte
/// counts on the provided channel; dropping the channel without sending is
/// allowed (no partial progress will be displayed).
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn begin_upload(
        &self,
        file_name: &str,
        size_bytes: u64,
        data: Vec<u8>,
        progress: mpsc::Sender<u64>,
    ) -> Result<String>;
}

enum AttemptOutcome {
    Accepted(String),
    Cancelled,
    Error(uplift_common::Error),
}

/// Drives one session's transfer from admission to `Queued` or `Failed`
pub struct TransferDriver {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn UploadSink>,
    event_bus: EventBus,
    max_retries: u32,
    backoff_base: Duration,
    poller_notify: Arc<Notify>,
}

impl TransferDriver {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sink: Arc<dyn UploadSink>,
        event_bus: EventBus,
        max_retries: u32,
        poller_notify: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            sink,
            event_bus,
            // At least one attempt even with a zero retry bound
            max_retries: max_retries.max(1),
            backoff_base: Duration::from_millis(250),
            poller_notify,
        }
    }

    /// Override the backoff base (tests use a short one)
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Run the transfer for a registered session until `Queued` or `Failed`
    pub async fn run(&self, session_id: Uuid, data: Vec<u8>, cancel: CancellationToken) {
        let Some(snapshot) = self.registry.get(session_id).await else {
            return;
        };
        let file_name = snapshot.file_name().to_string();
        let size_bytes = snapshot.file_size_bytes();

        for attempt in 1..=self.max_retries {
            // Terminal here means the caller cancelled between attempts
            match self.registry.update(session_id, |s| s.begin_attempt()).await {
                Some(Some(_)) => {}
                _ => return,
            }

            let outcome = self
                .attempt(session_id, &file_name, size_bytes, data.clone(), &cancel)
                .await;

            match outcome {
                AttemptOutcome::Accepted(pipeline_id) => {
                    tracing::info!(
                        session_id = %session_id,
                        pipeline_id = %pipeline_id,
                        attempt = attempt,
                        "Upload sink acknowledged full file"
                    );
                    self.finish_queued(session_id, size_bytes, pipeline_id).await;
                    return;
                }
                AttemptOutcome::Cancelled => {
                    tracing::info!(session_id = %session_id, "Transfer cancelled");
                    self.fail_session(session_id, "cancelled").await;
                    return;
                }
                AttemptOutcome::Error(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        attempt = attempt,
                        max_attempts = self.max_retries,
                        error = %e,
                        "Transfer attempt failed"
                    );
                    if attempt == self.max_retries {
                        self.fail_session(
                            session_id,
                            format!("transfer failed after {} attempts: {}", attempt, e),
                        )
                        .await;
                        return;
                    }
                    let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => {
                            self.fail_session(session_id, "cancelled").await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        session_id: Uuid,
        file_name: &str,
        size_bytes: u64,
        data: Vec<u8>,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let (tx, mut rx) = mpsc::channel::<u64>(32);
        let upload = self.sink.begin_upload(file_name, size_bytes, data, tx);
        tokio::pin!(upload);

        let mut progress_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return AttemptOutcome::Cancelled,
                received = rx.recv(), if progress_open => match received {
                    Some(bytes_acknowledged) => {
                        self.record_progress(session_id, size_bytes, bytes_acknowledged).await;
                    }
                    None => progress_open = false,
                },
                result = &mut upload => {
                    return match result {
                        Ok(pipeline_id) => AttemptOutcome::Accepted(pipeline_id),
                        Err(e) => AttemptOutcome::Error(e),
                    };
                }
            }
        }
    }

    async fn record_progress(&self, session_id: Uuid, size_bytes: u64, bytes_acknowledged: u64) {
        let updated = self
            .registry
            .update(session_id, |s| {
                s.record_transfer_progress(bytes_acknowledged);
                (s.bytes_acknowledged(), s.progress_pct())
            })
            .await;
        if let Some((acked, pct)) = updated {
            self.event_bus.emit(UpliftEvent::TransferProgress {
                session_id,
                bytes_acknowledged: acked,
                bytes_total: size_bytes,
                progress_pct: pct,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    async fn finish_queued(&self, session_id: Uuid, size_bytes: u64, pipeline_id: String) {
        let result = self
            .registry
            .update(session_id, |s| {
                let transition = s.mark_queued(pipeline_id);
                (transition, s.progress_pct())
            })
            .await;
        if let Some((Some(transition), pct)) = result {
            self.event_bus.emit(UpliftEvent::TransferProgress {
                session_id,
                bytes_acknowledged: size_bytes,
                bytes_total: size_bytes,
                progress_pct: pct,
                timestamp: chrono::Utc::now(),
            });
            self.event_bus.emit(UpliftEvent::StageChanged {
                session_id,
                old_stage: transition.old_stage,
                new_stage: transition.new_stage,
                progress_pct: pct,
                timestamp: transition.transitioned_at,
            });
            // Wake the poller: a new pipeline id wants stage refresh
            self.poller_notify.notify_one();
        }
    }

    async fn fail_session(&self, session_id: Uuid, reason: impl Into<String>) {
        let reason = reason.into();
        let transition = self
            .registry
            .update(session_id, |s| s.fail(reason.clone()))
            .await
            .flatten();
        if transition.is_some() {
            self.event_bus.emit(UpliftEvent::SessionFailed {
                session_id,
                error: reason,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}
