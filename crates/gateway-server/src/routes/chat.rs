use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use gateway_core::validate::{
    validate_request, HEADER_MAX_TURNS, HEADER_MAX_THINKING_TOKENS, HEADER_PERMISSION_MODE,
};
use gateway_core::{FieldError, GatewayError, HeaderOverrides, ViolationKind};

use crate::error::AppError;
use crate::state::AppState;
use crate::{service, streaming};

/// POST /v1/chat/completions — branch on `stream`.
pub async fn create_chat_completion(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let body = parse_body(&body)?;
    let overrides = parse_overrides(&headers)?;
    let validated = validate_request(&body)?;

    if app.config.debug_mode {
        tracing::debug!(report = ?validated.report, "compatibility report");
    }

    if validated.request.stream {
        Ok(streaming::begin(&app, validated, overrides).into_response())
    } else {
        let response = service::complete(&app, validated, overrides).await?;
        Ok(Json(response).into_response())
    }
}

pub(crate) fn parse_body(body: &Bytes) -> Result<serde_json::Value, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        AppError(GatewayError::validation(vec![FieldError::new(
            "body",
            ViolationKind::TypeMismatch,
            format!("request body is not valid JSON: {e}"),
        )]))
    })
}

pub(crate) fn parse_overrides(headers: &HeaderMap) -> Result<HeaderOverrides, AppError> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    HeaderOverrides::parse(
        get(HEADER_MAX_TURNS),
        get(HEADER_PERMISSION_MODE),
        get(HEADER_MAX_THINKING_TOKENS),
    )
    .map_err(AppError)
}
