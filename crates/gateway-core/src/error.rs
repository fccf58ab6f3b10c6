use serde::Serialize;
use thiserror::Error;

/// The kind of shape violation reported for a single request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    TypeMismatch,
    ValueOutOfRange,
    EnumViolation,
}

/// One per-field validation failure, surfaced in the error `details`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Unified error taxonomy for the gateway.
///
/// The HTTP layer maps each kind to a status exactly once; everything below
/// it returns these variants and never touches status codes.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request validation failed")]
    Validation { details: Vec<FieldError> },

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    NotFound(String),

    /// The Claude CLI cannot be used at all: not installed, unresponsive,
    /// or not authenticated.
    #[error("{0}")]
    ClaudeUnavailable(String),

    /// The CLI was invoked but the invocation failed.
    #[error("{0}")]
    Claude(String),

    #[error("{0}")]
    Timeout(String),

    /// A session expired between the caller's read and its write.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(details: Vec<FieldError>) -> Self {
        GatewayError::Validation { details }
    }

    /// Wire value of the `error.type` field.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "validation_error",
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::NotFound(_) | GatewayError::SessionExpired(_) => "not_found",
            GatewayError::ClaudeUnavailable(_) => "claude_unavailable",
            GatewayError::Claude(_) => "claude_error",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Wire value of the `error.code` field.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "invalid_request",
            GatewayError::Authentication(_) => "unauthorized",
            GatewayError::NotFound(_) | GatewayError::SessionExpired(_) => "not_found",
            GatewayError::ClaudeUnavailable(_) => "service_unavailable",
            GatewayError::Claude(_) => "upstream_error",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// The `{error: {...}}` response body.
    pub fn body(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.error_type(),
            "code": self.code(),
        });
        if let GatewayError::Validation { details } = self {
            error["details"] = serde_json::to_value(details).unwrap_or_default();
        }
        serde_json::json!({ "error": error })
    }
}

/// Convenience `Result` alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
