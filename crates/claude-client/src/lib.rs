//! `claude-client` — resolver and streaming driver for the Claude CLI.
//!
//! Implements the `--output-format stream-json` protocol as a Rust library:
//! locate the installed `claude` binary, spawn it for a prompt, and expose
//! the newline-delimited JSON output as a typed async stream.
//!
//! # Architecture
//!
//! ```text
//! ClaudeResolver  ← explicit path / cache / install dirs / $PATH,
//!     │             verified with `claude --version`
//!     ▼
//! ClaudeProcess   ← spawns `claude --print --output-format stream-json …`,
//!     │             prompt via stdin, reads JSONL, SIGTERM→SIGKILL ladder
//!     ▼
//! EventStream     ← futures::Stream<Item = Result<ClaudeEvent>>,
//!     │             capacity-1 channel, drop = cancel
//!     ▼
//! ClaudeEvent     ← normalized: TextDelta / ToolUse / Thinking /
//!                   Usage / Error / End
//! ```
//!
//! The raw CLI vocabulary lives entirely in the `wire` module; everything
//! above it speaks [`ClaudeEvent`].

pub mod error;
pub mod resolver;
pub mod stream;
pub mod types;

pub(crate) mod process;
pub(crate) mod wire;

#[cfg(test)]
mod tests;

pub use error::ClaudeClientError;
pub use resolver::{ClaudeResolver, ResolvedClaude};
pub use stream::EventStream;
pub use types::{
    ClaudeEvent, EndReason, FailureKind, InvokeOptions, PermissionMode, ToolChoice, ToolSchema,
    VerifyStatus,
};

use std::path::PathBuf;
use std::sync::Arc;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeClientError>;

/// Handle to the installed Claude CLI.
///
/// Cheap to clone; the resolver cache is shared.
#[derive(Clone)]
pub struct ClaudeClient {
    resolver: Arc<ClaudeResolver>,
}

impl ClaudeClient {
    /// `explicit` pins the binary path from configuration; `None` enables
    /// discovery.
    pub fn new(explicit: Option<PathBuf>) -> Self {
        ClaudeClient {
            resolver: Arc::new(ClaudeResolver::new(explicit)),
        }
    }

    /// Probe the CLI: resolve a path and run `--version`.
    pub async fn verify(&self) -> VerifyStatus {
        self.resolver.verify().await
    }

    /// Start one invocation. Events arrive as the subprocess produces them;
    /// dropping the returned stream cancels the invocation.
    pub fn run(&self, prompt: impl Into<String>, opts: InvokeOptions) -> EventStream {
        EventStream::spawn(self.resolver.clone(), prompt.into(), opts)
    }

    pub fn resolver(&self) -> &Arc<ClaudeResolver> {
        &self.resolver
    }
}
