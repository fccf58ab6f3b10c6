use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use gateway_core::validate::{compatibility_report, validate_request};
use gateway_core::GatewayError;

use crate::error::AppError;
use crate::routes::chat::{parse_body, parse_overrides};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "claude-gateway";

/// GET /health — never touches Claude.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
    }))
}

/// GET /v1/auth/status — how the CLI authenticates plus this server's own
/// key policy. Environment variable NAMES only; values never leave the
/// process.
pub async fn auth_status(State(app): State<AppState>) -> Json<serde_json::Value> {
    let claude = app.auth.claude_auth();
    let verify = app.backend.verify().await;

    let status = match claude {
        crate::auth::ClaudeAuth::CliManaged => {
            if verify.available {
                "authenticated"
            } else {
                "not_authenticated"
            }
        }
        _ => "configured",
    };

    Json(json!({
        "claude_code_auth": {
            "method": claude.method(),
            "status": status,
            "environment_variables": claude.env_var_names(),
        },
        "server_info": {
            "api_key_required": app.auth.api_key_required(),
            "api_key_source": app.auth.api_key_source(),
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

/// POST /v1/compatibility — run the validator, return its report, never
/// invoke Claude.
pub async fn compatibility(body: Bytes) -> Result<Json<serde_json::Value>, AppError> {
    let body = parse_body(&body)?;
    let report = compatibility_report(&body);

    match validate_request(&body) {
        Ok(_) => Ok(Json(json!({
            "valid": true,
            "compatibility": report,
        }))),
        Err(GatewayError::Validation { details }) => Ok(Json(json!({
            "valid": false,
            "compatibility": report,
            "errors": details,
        }))),
        Err(other) => Err(AppError(other)),
    }
}

/// POST /v1/debug/request — echo the request for client debugging, with
/// credentials redacted and the validation verdict attached.
pub async fn debug_request(
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let parsed = parse_body(&body)?;

    let mut echoed_headers = serde_json::Map::new();
    for (name, value) in &headers {
        let shown = if name == axum::http::header::AUTHORIZATION {
            "<redacted>".to_string()
        } else {
            value.to_str().unwrap_or("<binary>").to_string()
        };
        echoed_headers.insert(name.to_string(), json!(shown));
    }

    let verdict = match parse_overrides(&headers)
        .map_err(|e| e.0)
        .and_then(|_| validate_request(&parsed))
    {
        Ok(validated) => json!({
            "valid": true,
            "compatibility": validated.report,
        }),
        Err(GatewayError::Validation { details }) => json!({
            "valid": false,
            "errors": details,
        }),
        Err(other) => return Err(AppError(other)),
    };

    Ok(Json(json!({
        "debug": {
            "headers": echoed_headers,
            "body": parsed,
            "validation": verdict,
        },
        "example_request": example_request(),
    })))
}

fn example_request() -> serde_json::Value {
    json!({
        "model": "claude-3-5-haiku-20241022",
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello!"}
        ],
        "stream": false,
        "session_id": "my-conversation",
    })
}
