//! Environment-driven gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime knobs consumed by the core. Every field has an environment
/// variable; the CLI front-end also exposes each as a flag.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `PORT`
    pub port: u16,
    /// `CORS_ORIGINS` — comma-separated, `*` for any.
    pub cors_origins: Vec<String>,
    /// `MAX_TIMEOUT` — per-request deadline in milliseconds.
    pub max_timeout_ms: u64,
    /// `API_KEY` — when set, bearer auth is required on everything but
    /// `/health`.
    pub api_key: Option<String>,
    /// `DEBUG_MODE`
    pub debug_mode: bool,
    /// `VERBOSE`
    pub verbose: bool,
    /// `CLAUDE_BIN` — explicit path to the Claude CLI.
    pub claude_binary: Option<PathBuf>,
    /// `SESSION_TTL_SECONDS`
    pub session_ttl: Duration,
    /// `SESSION_CLEANUP_INTERVAL_SECONDS`
    pub session_cleanup_interval: Duration,
    /// `STREAM_HEARTBEAT_SECONDS`
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_timeout_ms: 600_000,
            api_key: None,
            debug_mode: false,
            verbose: false,
            claude_binary: None,
            session_ttl: Duration::from_secs(3600),
            session_cleanup_interval: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

impl GatewayConfig {
    /// Build a config from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            port: env_parse("PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(defaults.cors_origins),
            max_timeout_ms: env_parse("MAX_TIMEOUT").unwrap_or(defaults.max_timeout_ms),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            debug_mode: env_flag("DEBUG_MODE"),
            verbose: env_flag("VERBOSE"),
            claude_binary: std::env::var("CLAUDE_BIN").ok().map(PathBuf::from),
            session_ttl: env_parse("SESSION_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            session_cleanup_interval: env_parse("SESSION_CLEANUP_INTERVAL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_cleanup_interval),
            heartbeat_interval: env_parse("STREAM_HEARTBEAT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
        }
    }

    pub fn allow_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}
