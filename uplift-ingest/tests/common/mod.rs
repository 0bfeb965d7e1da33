//! Shared test helpers: mock pipeline collaborators and state builders

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use uplift_common::{Error, EventBus, IngestConfig, Result};
use uplift_ingest::services::poller::{PipelineStatusSource, StatusReport};
use uplift_ingest::services::transfer::UploadSink;
use uplift_ingest::AppState;

/// Sink that fails a configured number of attempts, then accepts the file
/// with progress reported in four steps.
pub struct MockSink {
    failures_remaining: AtomicU32,
    pipeline_id: String,
}

impl MockSink {
    pub fn accepting(pipeline_id: &str) -> Self {
        Self::failing_first(0, pipeline_id)
    }

    pub fn failing_first(failures: u32, pipeline_id: &str) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            pipeline_id: pipeline_id.to_string(),
        }
    }
}

#[async_trait]
impl UploadSink for MockSink {
    async fn begin_upload(
        &self,
        _file_name: &str,
        size_bytes: u64,
        _data: Vec<u8>,
        progress: mpsc::Sender<u64>,
    ) -> Result<String> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Transfer("connection reset by sink".to_string()));
        }
        for quarter in 1..=4u64 {
            let _ = progress.send(size_bytes * quarter / 4).await;
            tokio::task::yield_now().await;
        }
        Ok(self.pipeline_id.clone())
    }
}

/// Sink that never completes; used to hold a session in `Transferring`
pub struct PendingSink;

#[async_trait]
impl UploadSink for PendingSink {
    async fn begin_upload(
        &self,
        _file_name: &str,
        _size_bytes: u64,
        _data: Vec<u8>,
        _progress: mpsc::Sender<u64>,
    ) -> Result<String> {
        futures::future::pending::<()>().await;
        unreachable!()
    }
}

/// Status source that replays a scripted sequence of responses
pub struct ScriptedStatusSource {
    script: Mutex<VecDeque<Result<StatusReport>>>,
}

impl ScriptedStatusSource {
    pub fn new(responses: Vec<Result<StatusReport>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn report(stage: uplift_common::events::PipelineStage) -> Result<StatusReport> {
        Ok(StatusReport {
            stage,
            rows_processed: None,
            error: None,
        })
    }
}

#[async_trait]
impl PipelineStatusSource for ScriptedStatusSource {
    async fn get_status(&self, _pipeline_id: &str) -> Result<StatusReport> {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Error::Pipeline("scripted responses exhausted".to_string())))
    }
}

/// Test config with short intervals and a small size limit override hook
pub fn test_config() -> IngestConfig {
    IngestConfig {
        poll_interval_ms: 10,
        ..IngestConfig::default()
    }
}

/// App state wired to the given sink
pub fn test_state(config: IngestConfig, sink: Arc<dyn UploadSink>) -> AppState {
    AppState::new(config, EventBus::new(256), sink)
}
