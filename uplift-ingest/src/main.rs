//! uplift-ingest - File Ingestion Service
//!
//! Accepts file uploads, drives them through the remote processing
//! pipeline (upload -> queue -> normalize -> data-quality check), and
//! keeps an observable view of each file's progress for any number of
//! concurrent watchers.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uplift_common::{EventBus, IngestConfig};
use uplift_ingest::services::poller::StagePoller;
use uplift_ingest::services::remote::{HttpStatusSource, HttpUploadSink};
use uplift_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting uplift-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = IngestConfig::load();

    let sink_url = config
        .sink_base_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("sink_base_url not configured (UPLIFT_SINK_URL)"))?;
    let status_url = config
        .status_base_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("status_base_url not configured (UPLIFT_STATUS_URL)"))?;

    let event_bus = EventBus::new(1000);
    let sink = Arc::new(HttpUploadSink::new(sink_url));
    let state = AppState::new(config.clone(), event_bus.clone(), sink);

    // Single shared poller; idles while the registry has no active sessions
    let poller = StagePoller::new(
        state.registry.clone(),
        Arc::new(HttpStatusSource::new(status_url)),
        event_bus,
        &config,
        state.poller_notify.clone(),
    );
    let poller_cancel = tokio_util::sync::CancellationToken::new();
    let poller_token = poller_cancel.clone();
    tokio::spawn(async move { poller.run(poller_token).await });

    let app = uplift_ingest::build_router(state);

    let addr = format!("127.0.0.1:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller_cancel.cancel();
    info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
