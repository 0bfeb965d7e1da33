//! uplift-ingest library interface
//!
//! Exposes the application state, router, and core services for
//! integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::registry::SessionRegistry;
use crate::services::transfer::UploadSink;
use crate::services::validator::UploadPolicy;
use uplift_common::{EventBus, IngestConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Single source of truth for all sessions
    pub registry: Arc<SessionRegistry>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Resolved service configuration
    pub config: Arc<IngestConfig>,
    /// Upload sink the transfer driver streams into
    pub sink: Arc<dyn UploadSink>,
    /// Cancellation tokens for in-flight transfers
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Wakes the poller out of its idle wait on new submissions
    pub poller_notify: Arc<Notify>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: IngestConfig, event_bus: EventBus, sink: Arc<dyn UploadSink>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            event_bus,
            config: Arc::new(config),
            sink,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            poller_notify: Arc::new(Notify::new()),
            startup_time: Utc::now(),
        }
    }

    /// Admission policy derived from the current configuration
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::from_config(&self.config)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::cors::CorsLayer;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
        .with_state(state)
}
