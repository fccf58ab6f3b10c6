//! The narrow seam between the completion service and the Claude CLI.
//!
//! The service depends on this trait, not on the concrete client, so tests
//! inject scripted event sequences via [`EventStream::from_channel`].

use std::path::PathBuf;

use async_trait::async_trait;
use claude_client::{ClaudeClient, EventStream, InvokeOptions, VerifyStatus};

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Probe the backing CLI: is it installed, and which version.
    async fn verify(&self) -> VerifyStatus;

    /// Start one invocation. Dropping the returned stream cancels it.
    fn invoke(&self, prompt: String, opts: InvokeOptions) -> EventStream;
}

/// The production backend: a resolved Claude CLI subprocess per invocation.
pub struct CliBackend {
    client: ClaudeClient,
}

impl CliBackend {
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        CliBackend {
            client: ClaudeClient::new(explicit_path),
        }
    }
}

#[async_trait]
impl CompletionBackend for CliBackend {
    async fn verify(&self) -> VerifyStatus {
        self.client.verify().await
    }

    fn invoke(&self, prompt: String, opts: InvokeOptions) -> EventStream {
        self.client.run(prompt, opts)
    }
}
