//! Stats endpoint
//!
//! GET /stats - rollup counters derived from the registry on demand

use axum::{extract::State, routing::get, Json, Router};

use crate::error::ApiResult;
use crate::models::IngestStats;
use crate::services::stats;
use crate::AppState;

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<IngestStats>> {
    let snapshot = stats::snapshot(&state.registry, state.config.storage_limit_bytes).await;
    Ok(Json(snapshot))
}
