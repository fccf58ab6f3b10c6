use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_core::GatewayError;

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Wraps [`GatewayError`] so route handlers can return `Result<_, AppError>`.
///
/// This is the single place a gateway error kind becomes an HTTP status;
/// the body is always the `{error:{message,type,code,details?}}` shape.
#[derive(Debug)]
pub struct AppError(pub GatewayError);

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError(GatewayError::NotFound(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError(GatewayError::Internal(msg.into()))
    }
}

/// Status for a given error kind. Shared with the streaming layer, which
/// reports the same kinds in-stream after headers are out.
pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
        GatewayError::NotFound(_) | GatewayError::SessionExpired(_) => StatusCode::NOT_FOUND,
        GatewayError::ClaudeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Claude(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.error_type(), "request failed");
        }
        (status, axum::Json(self.0.body())).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError(err)
    }
}
