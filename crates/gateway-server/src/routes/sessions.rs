use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::sessions::{SessionSummary, StoreStats};
use crate::state::AppState;

/// GET /v1/sessions — summaries ordered by last access.
pub async fn list_sessions(State(app): State<AppState>) -> Json<serde_json::Value> {
    let data: Vec<SessionSummary> = app.sessions.list().await;
    Json(json!({
        "object": "list",
        "data": data,
    }))
}

/// GET /v1/sessions/stats
pub async fn session_stats(State(app): State<AppState>) -> Json<StoreStats> {
    Json(app.sessions.stats().await)
}

/// GET /v1/sessions/{id}
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = app
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| AppError::not_found(format!("session '{id}' not found")))?;

    Ok(Json(json!({
        "id": session.id,
        "created_at": session.created_at,
        "last_accessed": session.last_accessed,
        "expires_at": session.expires_at,
        "message_count": session.messages.len(),
        "messages": session.messages,
    })))
}

/// DELETE /v1/sessions/{id}
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if app.sessions.delete(&id).await {
        Ok(Json(json!({ "id": id, "deleted": true })))
    } else {
        Err(AppError::not_found(format!("session '{id}' not found")))
    }
}

/// POST /v1/sessions and PATCH /v1/sessions/{id} — creation and metadata
/// patching are not implemented; refuse loudly rather than accept silently.
pub async fn not_implemented() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": {
                "message": "sessions are created implicitly by chat completions; \
                            explicit create/patch is not supported",
                "type": "not_found",
                "code": "not_implemented",
            }
        })),
    )
        .into_response()
}
