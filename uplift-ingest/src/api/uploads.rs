//! Upload session API handlers
//!
//! POST /uploads, GET /uploads, GET /uploads/:id,
//! POST /uploads/:id/cancel, DELETE /uploads/:id

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{PipelineStage, SessionFilter, UploadSession};
use crate::services::transfer::TransferDriver;
use crate::services::validator;
use crate::AppState;
use uplift_common::UpliftEvent;

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(submit_upload).get(list_uploads))
        .route("/uploads/:id", get(get_upload).delete(evict_upload))
        .route("/uploads/:id/cancel", post(cancel_upload))
        // The size policy is enforced while streaming the file part, so the
        // transport-level limit stays open and rejections carry the
        // policy's reason instead of a bare 413.
        .layer(DefaultBodyLimit::disable())
}

/// POST /uploads response
#[derive(Debug, Serialize)]
pub struct SubmitUploadResponse {
    pub session_id: Uuid,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub stage: PipelineStage,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// GET /uploads query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListUploadsQuery {
    pub status: Option<String>,
}

/// GET /uploads response
#[derive(Debug, Serialize)]
pub struct ListUploadsResponse {
    pub sessions: Vec<UploadSession>,
    pub total: usize,
}

/// POST /uploads/:id/cancel response
#[derive(Debug, Serialize)]
pub struct CancelUploadResponse {
    pub session_id: Uuid,
    pub stage: PipelineStage,
    pub cancelled_at: chrono::DateTime<chrono::Utc>,
}

/// POST /uploads - accept a multipart file submission
///
/// Validation errors surface synchronously as 400 with the policy reason;
/// admitted files return 202 and progress asynchronously.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitUploadResponse>)> {
    let policy = state.policy();
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .ok_or_else(|| ApiError::BadRequest("file part missing a filename".to_string()))?
                .to_string();
            // Read the part chunkwise; an oversized body is cut off at the
            // policy limit instead of being buffered whole.
            let mut data = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read file part: {}", e)))?
            {
                if (data.len() + chunk.len()) as u64 > policy.max_bytes {
                    return Err(ApiError::BadRequest(
                        validator::ValidationError::ExceedsSizeLimit.to_string(),
                    ));
                }
                data.extend_from_slice(&chunk);
            }
            file = Some((file_name, data));
        }
    }
    let (file_name, data) =
        file.ok_or_else(|| ApiError::BadRequest("missing \"file\" part".to_string()))?;

    let extension = validator::extension_of(&file_name);
    let size_bytes = data.len() as u64;
    validator::validate(&file_name, size_bytes, &extension, &policy)
        .map_err(|reason| ApiError::BadRequest(reason.to_string()))?;

    let session = UploadSession::new(file_name.clone(), size_bytes, extension);
    let session_id = session.session_id();
    let created_at = session.created_at();
    state.registry.register(session).await?;

    state.event_bus.emit(UpliftEvent::SessionRegistered {
        session_id,
        file_name: file_name.clone(),
        file_size_bytes: size_bytes,
        timestamp: created_at,
    });

    let cancel = tokio_util::sync::CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(session_id, cancel.clone());

    tracing::info!(
        session_id = %session_id,
        file_name = %file_name,
        file_size_bytes = size_bytes,
        "Upload session admitted"
    );

    // Drive the transfer in the background; the read surface observes it
    // through the registry.
    let driver = TransferDriver::new(
        state.registry.clone(),
        state.sink.clone(),
        state.event_bus.clone(),
        state.config.max_transfer_retries,
        state.poller_notify.clone(),
    );
    let tokens = state.cancellation_tokens.clone();
    let notify = state.poller_notify.clone();
    tokio::spawn(async move {
        driver.run(session_id, data, cancel).await;
        tokens.write().await.remove(&session_id);
    });
    // Wake the poller out of idle; the registry now has a non-terminal entry
    notify.notify_one();

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitUploadResponse {
            session_id,
            file_name,
            file_size_bytes: size_bytes,
            stage: PipelineStage::Validated,
            created_at,
        }),
    ))
}

/// GET /uploads - ordered session snapshots
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<ListUploadsQuery>,
) -> ApiResult<Json<ListUploadsResponse>> {
    let filter = match query.status.as_deref() {
        None => None,
        Some("active") => Some(SessionFilter::Active),
        Some("terminal") => Some(SessionFilter::Terminal),
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "unknown status filter: {}",
                other
            )))
        }
    };
    let sessions = state.registry.list(filter).await;
    let total = sessions.len();
    Ok(Json(ListUploadsResponse { sessions, total }))
}

/// GET /uploads/:id - single session snapshot
pub async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UploadSession>> {
    state
        .registry
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))
}

/// POST /uploads/:id/cancel - cancel an in-flight session
///
/// Moves the session to `Failed` with reason "cancelled" and stops its
/// transfer task; terminal sessions return 409.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelUploadResponse>> {
    let session = state
        .registry
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
    if session.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "session {} already terminal",
            id
        )));
    }

    if let Some(token) = state.cancellation_tokens.read().await.get(&id) {
        token.cancel();
    }
    // Fail directly as well; the transition is idempotent so whichever of
    // the handler and the transfer driver gets there first wins.
    let transition = state
        .registry
        .update(id, |s| s.fail("cancelled"))
        .await
        .flatten();
    if transition.is_some() {
        state.event_bus.emit(UpliftEvent::SessionFailed {
            session_id: id,
            error: "cancelled".to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    tracing::info!(session_id = %id, "Session cancelled");

    Ok(Json(CancelUploadResponse {
        session_id: id,
        stage: PipelineStage::Failed,
        cancelled_at: chrono::Utc::now(),
    }))
}

/// DELETE /uploads/:id - explicit eviction
pub async fn evict_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UploadSession>> {
    // Stop the transfer first when the session is still in flight
    if let Some(token) = state.cancellation_tokens.read().await.get(&id) {
        token.cancel();
    }
    let session = state
        .registry
        .evict(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
    state.event_bus.emit(UpliftEvent::SessionEvicted {
        session_id: id,
        timestamp: chrono::Utc::now(),
    });
    tracing::info!(session_id = %id, "Session evicted");
    Ok(Json(session))
}
