use std::collections::HashMap;
use std::path::PathBuf;

// ─── Normalized events ────────────────────────────────────────────────────

/// One normalized event from a Claude CLI invocation.
///
/// The raw `--output-format stream-json` vocabulary (see `wire`) is mapped
/// into this closed set; nothing outside the `wire` module ever sees the
/// CLI's own field names.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaudeEvent {
    /// A piece of assistant text, in emission order.
    TextDelta { text: String },
    /// Start or continuation of a tool call. `name` is present on the first
    /// event for a given `id`; later events with the same `id` extend
    /// `partial_arguments`.
    ToolUse {
        id: String,
        name: Option<String>,
        partial_arguments: String,
    },
    /// Reasoning tokens. Never forwarded to clients.
    Thinking { text: String },
    /// Token accounting for the whole invocation.
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    /// The invocation failed; no `End` will follow.
    Error { kind: FailureKind, message: String },
    /// The assistant turn completed.
    End { reason: EndReason },
}

/// Terminal status of a successful assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Stop,
    ToolCalls,
    Length,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Stop => "stop",
            EndReason::ToolCalls => "tool_calls",
            EndReason::Length => "length",
        }
    }
}

/// Failure classification carried by [`ClaudeEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// stdout ended or became undecodable before a terminal result.
    ParseError,
    /// The subprocess exited non-zero or reported an execution error.
    SubprocessFailure,
    /// The invocation outlived its `timeout_ms` budget.
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ParseError => "parse_error",
            FailureKind::SubprocessFailure => "subprocess_failure",
            FailureKind::Timeout => "timeout",
        }
    }
}

// ─── Invocation options ───────────────────────────────────────────────────

/// A client-executed function schema advertised to the model.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema for the arguments. Schema-polymorphic, so `Value`.
    pub parameters: serde_json::Value,
}

/// Which advertised tools the model may call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    /// Force a single named function.
    Function(String),
}

/// Permission mode — controls how the CLI authorizes its own tool use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }

    /// Parse the wire spelling used by the CLI and by request headers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(PermissionMode::Default),
            "acceptEdits" => Some(PermissionMode::AcceptEdits),
            "bypassPermissions" => Some(PermissionMode::BypassPermissions),
            _ => None,
        }
    }
}

/// Options for one Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub model: String,
    pub system_prompt: Option<String>,
    /// Maximum agentic turns; always ≥ 1.
    pub max_turns: u32,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
    pub permission_mode: PermissionMode,
    /// 0 disables extended thinking.
    pub max_thinking_tokens: u32,
    /// CLI-native conversation to resume, when the caller uses that path.
    pub resume_session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Authentication environment for the subprocess.
    pub env_overrides: HashMap<String, String>,
    pub timeout_ms: u64,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        InvokeOptions {
            model: String::new(),
            system_prompt: None,
            max_turns: 2,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            permission_mode: PermissionMode::Default,
            max_thinking_tokens: 0,
            resume_session_id: None,
            cwd: None,
            env_overrides: HashMap::new(),
            timeout_ms: 600_000,
        }
    }
}

// ─── Verification ─────────────────────────────────────────────────────────

/// Result of probing the installed Claude CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyStatus {
    pub fn available(version: String) -> Self {
        VerifyStatus {
            available: true,
            version: Some(version),
            error: None,
        }
    }

    pub fn unavailable(error: String) -> Self {
        VerifyStatus {
            available: false,
            version: None,
            error: Some(error),
        }
    }
}
