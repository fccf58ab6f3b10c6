//! Credential discovery for the Claude CLI plus bearer-token protection of
//! the gateway itself.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use gateway_core::GatewayError;

use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Claude credential discovery
// ---------------------------------------------------------------------------

/// How the Claude CLI will authenticate. Each variant carries its own data;
/// there is no dispatch beyond this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaudeAuth {
    /// `ANTHROPIC_API_KEY` present in the gateway's environment.
    ApiKey { env_var: &'static str },
    /// `CLAUDE_CODE_OAUTH_TOKEN` present in the gateway's environment.
    OauthToken { env_var: &'static str },
    /// No credential env vars; the CLI uses its own stored login.
    CliManaged,
}

impl ClaudeAuth {
    pub fn method(&self) -> &'static str {
        match self {
            ClaudeAuth::ApiKey { .. } => "api_key",
            ClaudeAuth::OauthToken { .. } => "oauth_token",
            ClaudeAuth::CliManaged => "claude_cli",
        }
    }

    pub fn env_var_names(&self) -> Vec<&'static str> {
        match self {
            ClaudeAuth::ApiKey { env_var } | ClaudeAuth::OauthToken { env_var } => vec![env_var],
            ClaudeAuth::CliManaged => Vec::new(),
        }
    }
}

/// Discovers credentials once at startup and answers two questions: what
/// environment the subprocess gets, and whether gateway callers must
/// present a bearer key.
pub struct AuthManager {
    claude_auth: ClaudeAuth,
    /// Values forwarded to the subprocess; never serialized.
    env_overrides: HashMap<String, String>,
    server_api_key: Option<String>,
    api_key_source: &'static str,
}

const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
const CLAUDE_CODE_OAUTH_TOKEN: &str = "CLAUDE_CODE_OAUTH_TOKEN";

impl AuthManager {
    /// Classify from the process environment. `server_api_key` comes from
    /// configuration (`API_KEY`).
    pub fn discover(server_api_key: Option<String>) -> Self {
        let mut env_overrides = HashMap::new();

        let claude_auth = if let Ok(key) = std::env::var(ANTHROPIC_API_KEY) {
            env_overrides.insert(ANTHROPIC_API_KEY.to_string(), key);
            ClaudeAuth::ApiKey {
                env_var: ANTHROPIC_API_KEY,
            }
        } else if let Ok(token) = std::env::var(CLAUDE_CODE_OAUTH_TOKEN) {
            env_overrides.insert(CLAUDE_CODE_OAUTH_TOKEN.to_string(), token);
            ClaudeAuth::OauthToken {
                env_var: CLAUDE_CODE_OAUTH_TOKEN,
            }
        } else {
            ClaudeAuth::CliManaged
        };

        Self::new(claude_auth, env_overrides, server_api_key)
    }

    pub fn new(
        claude_auth: ClaudeAuth,
        env_overrides: HashMap<String, String>,
        server_api_key: Option<String>,
    ) -> Self {
        let api_key_source = if server_api_key.is_some() {
            "environment"
        } else {
            "none"
        };
        AuthManager {
            claude_auth,
            env_overrides,
            server_api_key: server_api_key.filter(|k| !k.is_empty()),
            api_key_source,
        }
    }

    pub fn claude_auth(&self) -> &ClaudeAuth {
        &self.claude_auth
    }

    /// Environment handed to every Claude subprocess.
    pub fn env_overrides(&self) -> HashMap<String, String> {
        self.env_overrides.clone()
    }

    pub fn api_key_required(&self) -> bool {
        self.server_api_key.is_some()
    }

    pub fn api_key_source(&self) -> &'static str {
        self.api_key_source
    }

    /// Check an `Authorization` header value against the configured key.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<(), GatewayError> {
        let Some(expected) = &self.server_api_key else {
            return Ok(());
        };
        let Some(header) = header else {
            return Err(GatewayError::Authentication(
                "missing Authorization header".into(),
            ));
        };

        let presented = match header.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => header[7..].trim(),
            _ => {
                return Err(GatewayError::Authentication(
                    "Authorization header must use the Bearer scheme".into(),
                ))
            }
        };

        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::Authentication("invalid API key".into()))
        }
    }
}

/// Length-independent comparison; runtime does not reveal the match prefix.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Gate every endpoint except `/health` behind the configured bearer key.
/// A no-op when no key is configured.
pub async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Response {
    if !app.auth.api_key_required() || req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match app.auth.verify_bearer(header) {
        Ok(()) => next.run(req).await,
        Err(e) => AppError(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
