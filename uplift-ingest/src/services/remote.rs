//! HTTP implementations of the external pipeline interfaces
//!
//! The sink and status source are plain HTTP services in production; the
//! traits keep them swappable for tests.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::services::poller::{PipelineStatusSource, StatusReport};
use crate::services::transfer::UploadSink;
use uplift_common::{Error, Result};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// POST {base}/uploads response body
#[derive(Debug, Deserialize)]
struct BeginUploadResponse {
    pipeline_id: String,
}

/// Upload sink backed by the remote pipeline's HTTP ingress
pub struct HttpUploadSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploadSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UploadSink for HttpUploadSink {
    async fn begin_upload(
        &self,
        file_name: &str,
        size_bytes: u64,
        data: Vec<u8>,
        progress: mpsc::Sender<u64>,
    ) -> Result<String> {
        // Chunked request body; each chunk handed to the wire bumps the
        // cumulative progress counter.
        let chunks: Vec<(Vec<u8>, u64)> = data
            .chunks(UPLOAD_CHUNK_BYTES)
            .scan(0u64, |acc, chunk| {
                *acc += chunk.len() as u64;
                Some((chunk.to_vec(), *acc))
            })
            .collect();

        let body_stream = futures::stream::iter(chunks).then(move |(chunk, cumulative)| {
            let progress = progress.clone();
            async move {
                let _ = progress.send(cumulative).await;
                Ok::<Vec<u8>, std::io::Error>(chunk)
            }
        });

        let url = format!("{}/uploads", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-file-name", file_name)
            .header(reqwest::header::CONTENT_LENGTH, size_bytes)
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("upload request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Transfer(format!(
                "upload sink returned {}",
                response.status()
            )));
        }

        let accepted: BeginUploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Transfer(format!("malformed sink response: {}", e)))?;
        Ok(accepted.pipeline_id)
    }
}

/// Status source backed by the remote pipeline's status endpoint
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PipelineStatusSource for HttpStatusSource {
    async fn get_status(&self, pipeline_id: &str) -> Result<StatusReport> {
        let url = format!(
            "{}/pipelines/{}/status",
            self.base_url.trim_end_matches('/'),
            pipeline_id
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Pipeline(format!("status request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Pipeline(format!(
                "status source returned {}",
                response.status()
            )));
        }

        response
            .json::<StatusReport>()
            .await
            .map_err(|e| Error::Pipeline(format!("malformed status response: {}", e)))
    }
}
