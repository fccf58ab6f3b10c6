//! Orchestrates one completion: session snapshot, prompt construction,
//! backend invocation, event accumulation, session append.

use std::collections::HashMap;

use futures::StreamExt;

use claude_client::{ClaudeClientError, ClaudeEvent, EndReason, FailureKind};
use gateway_core::openai::{
    ChatMessage, Choice, CompletionResponse, FunctionCall, ResponseMessage, Role, ToolCall,
    UsageInfo,
};
use gateway_core::{GatewayError, HeaderOverrides, Result, ValidatedRequest};

use crate::state::AppState;
use crate::translate;

// ---------------------------------------------------------------------------
// Completion identity
// ---------------------------------------------------------------------------

/// `id` and `created`, generated exactly once per request. Every chunk of a
/// stream reuses these.
#[derive(Debug, Clone)]
pub struct CompletionMeta {
    pub id: String,
    pub created: i64,
}

impl CompletionMeta {
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().as_simple().to_string();
        CompletionMeta {
            id: format!("chatcmpl-{}", &hex[..8]),
            created: chrono::Utc::now().timestamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool-call accumulation
// ---------------------------------------------------------------------------

/// Orders tool calls by first appearance and concatenates argument
/// fragments arriving under the same call id.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<(String, String, String)>, // (id, name, arguments)
    index_by_id: HashMap<String, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one `ToolUse` event. Returns `(index, first_fragment)`.
    pub fn absorb(&mut self, id: &str, name: Option<&str>, arguments: &str) -> (u32, bool) {
        if let Some(&idx) = self.index_by_id.get(id) {
            self.calls[idx].2.push_str(arguments);
            (idx as u32, false)
        } else {
            let idx = self.calls.len();
            self.index_by_id.insert(id.to_string(), idx);
            self.calls.push((
                id.to_string(),
                name.unwrap_or_default().to_string(),
                arguments.to_string(),
            ));
            (idx as u32, true)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn into_tool_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCall {
                id,
                call_type: "function".to_string(),
                function: FunctionCall { name, arguments },
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Client-side failures → gateway taxonomy.
pub fn map_client_error(e: ClaudeClientError) -> GatewayError {
    if e.is_binary_missing() {
        return GatewayError::ClaudeUnavailable(e.to_string());
    }
    match e {
        ClaudeClientError::Unresponsive { .. } => GatewayError::ClaudeUnavailable(e.to_string()),
        other => GatewayError::Claude(other.to_string()),
    }
}

/// CLI-reported failures → gateway taxonomy.
pub fn map_failure(kind: FailureKind, message: String) -> GatewayError {
    match kind {
        FailureKind::Timeout => GatewayError::Timeout(message),
        FailureKind::ParseError | FailureKind::SubprocessFailure => GatewayError::Claude(message),
    }
}

// ---------------------------------------------------------------------------
// Session append
// ---------------------------------------------------------------------------

/// The messages a finished completion adds to its session: everything the
/// request carried after the leading system block, then the synthesized
/// assistant turn — one atomic append.
pub fn session_messages(request_messages: &[ChatMessage], assistant: ChatMessage) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = request_messages
        .iter()
        .skip_while(|m| m.role == Role::System)
        .cloned()
        .collect();
    messages.push(assistant);
    messages
}

pub fn assistant_message(content: String, tool_calls: Vec<ToolCall>) -> ChatMessage {
    if tool_calls.is_empty() {
        ChatMessage::assistant(Some(content), None)
    } else {
        // Assistant messages carrying tool calls have null content.
        ChatMessage::assistant(None, Some(tool_calls))
    }
}

// ---------------------------------------------------------------------------
// Non-streaming completion
// ---------------------------------------------------------------------------

pub async fn complete(
    state: &AppState,
    validated: ValidatedRequest,
    overrides: HeaderOverrides,
) -> Result<CompletionResponse> {
    let meta = CompletionMeta::generate();
    let request = &validated.request;

    let history = match &request.session_id {
        Some(sid) => state.sessions.get_or_create(sid).await,
        None => Vec::new(),
    };

    let invocation = translate::build_invocation(
        &validated,
        &overrides,
        &history,
        state.auth.env_overrides(),
        state.config.max_timeout_ms,
    );

    tracing::info!(
        completion_id = %meta.id,
        model = %request.model,
        session_id = request.session_id.as_deref().unwrap_or("-"),
        user = request.user.as_deref().unwrap_or("-"),
        prompt_bytes = invocation.prompt.len(),
        "chat completion"
    );

    let mut events = state.backend.invoke(invocation.prompt, invocation.options);

    let mut content = String::new();
    let mut acc = ToolCallAccumulator::new();
    let mut usage = UsageInfo::default();
    let mut finish: Option<EndReason> = None;

    while let Some(event) = events.next().await {
        match event.map_err(map_client_error)? {
            ClaudeEvent::TextDelta { text } => content.push_str(&text),
            ClaudeEvent::ToolUse {
                id,
                name,
                partial_arguments,
            } => {
                acc.absorb(&id, name.as_deref(), &partial_arguments);
            }
            ClaudeEvent::Thinking { .. } => {}
            ClaudeEvent::Usage {
                prompt_tokens,
                completion_tokens,
            } => usage = UsageInfo::new(prompt_tokens, completion_tokens),
            ClaudeEvent::Error { kind, message } => return Err(map_failure(kind, message)),
            ClaudeEvent::End { reason } => {
                finish = Some(reason);
                break;
            }
        }
    }

    let finish = finish
        .ok_or_else(|| GatewayError::Claude("event stream ended without a result".to_string()))?;

    let tool_calls = acc.into_tool_calls();
    let assistant = assistant_message(content, tool_calls);

    if let Some(sid) = &request.session_id {
        let appended = session_messages(&request.messages, assistant.clone());
        if let Err(e) = state.sessions.append(sid, appended).await {
            // The completion already succeeded; an expiry race only costs
            // the transcript update.
            tracing::warn!(session_id = %sid, error = %e, "session append skipped");
        }
    }

    Ok(CompletionResponse {
        id: meta.id,
        object: "chat.completion",
        created: meta.created,
        model: request.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content: assistant.content.clone(),
                tool_calls: assistant.tool_calls.clone(),
            },
            finish_reason: finish.as_str().to_string(),
        }],
        usage,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_ids_have_the_chatcmpl_prefix() {
        let meta = CompletionMeta::generate();
        assert!(meta.id.starts_with("chatcmpl-"));
        assert_eq!(meta.id.len(), "chatcmpl-".len() + 8);
        assert!(meta.id["chatcmpl-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn accumulator_concatenates_fragments_per_id() {
        let mut acc = ToolCallAccumulator::new();
        assert_eq!(acc.absorb("c1", Some("read_file"), "{\"p"), (0, true));
        assert_eq!(acc.absorb("c1", None, "ath\":\"/f\"}"), (0, false));
        assert_eq!(acc.absorb("c2", Some("list_dir"), "{}"), (1, true));

        let calls = acc.into_tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.name, "read_file");
        assert_eq!(calls[0].function.arguments, "{\"path\":\"/f\"}");
        assert_eq!(calls[1].id, "c2");
    }

    #[test]
    fn assistant_with_tool_calls_drops_content() {
        let calls = vec![ToolCall {
            id: "c1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "f".into(),
                arguments: "{}".into(),
            },
        }];
        let msg = assistant_message("ignored".into(), calls);
        assert!(msg.content.is_none());
        assert!(msg.tool_calls.is_some());

        let plain = assistant_message("kept".into(), Vec::new());
        assert_eq!(plain.content.as_deref(), Some("kept"));
        assert!(plain.tool_calls.is_none());
    }

    #[test]
    fn session_messages_skip_leading_system_only() {
        let request = vec![
            ChatMessage {
                role: Role::System,
                content: Some("sys".into()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::user("hi"),
        ];
        let out = session_messages(&request, ChatMessage::assistant(Some("yo".into()), None));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[1].role, Role::Assistant);
    }

    #[test]
    fn failure_kinds_map_to_their_status_families() {
        assert!(matches!(
            map_failure(FailureKind::Timeout, "t".into()),
            GatewayError::Timeout(_)
        ));
        assert!(matches!(
            map_failure(FailureKind::ParseError, "p".into()),
            GatewayError::Claude(_)
        ));
        assert!(matches!(
            map_failure(FailureKind::SubprocessFailure, "s".into()),
            GatewayError::Claude(_)
        ));
    }

    #[test]
    fn missing_binary_maps_to_unavailable() {
        let err = map_client_error(ClaudeClientError::NotInstalled("nope".into()));
        assert!(matches!(err, GatewayError::ClaudeUnavailable(_)));

        let err = map_client_error(ClaudeClientError::Process("exit 1".into()));
        assert!(matches!(err, GatewayError::Claude(_)));
    }
}
