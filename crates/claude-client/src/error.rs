use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeClientError {
    /// No Claude CLI binary could be located by any resolution strategy.
    #[error("Claude CLI not installed: {0}")]
    NotInstalled(String),

    /// A binary was found but `--version` did not answer within the probe
    /// timeout.
    #[error("Claude CLI at {path} did not respond to --version within {timeout_ms}ms")]
    Unresponsive { path: PathBuf, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse stream-json line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Subprocess stdout exceeded {limit_bytes} byte cap")]
    OutputCapExceeded { limit_bytes: usize },
}

impl ClaudeClientError {
    /// True when the failure means the resolved binary path is stale and the
    /// resolver cache must be invalidated before the next attempt.
    pub fn is_binary_missing(&self) -> bool {
        match self {
            ClaudeClientError::NotInstalled(_) => true,
            ClaudeClientError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
