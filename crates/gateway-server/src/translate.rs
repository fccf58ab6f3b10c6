//! Maps a validated OpenAI request plus session context onto a Claude CLI
//! invocation.

use std::collections::HashMap;

use claude_client::{InvokeOptions, ToolSchema};
use gateway_core::openai::{ChatMessage, Role, ToolChoice};
use gateway_core::{HeaderOverrides, ValidatedRequest};

/// Everything the backend needs for one invocation.
#[derive(Debug)]
pub struct Invocation {
    pub prompt: String,
    pub options: InvokeOptions,
}

/// Build the CLI invocation.
///
/// `history` is the session's message log (empty without a session). The
/// conversation is carried by re-prepending the rendered transcript to the
/// prompt — the one and only context mechanism; `--resume` is not used.
pub fn build_invocation(
    validated: &ValidatedRequest,
    overrides: &HeaderOverrides,
    history: &[ChatMessage],
    env_overrides: HashMap<String, String>,
    timeout_ms: u64,
) -> Invocation {
    let request = &validated.request;

    let leading_system = request
        .messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();
    let (system_messages, conversation) = request.messages.split_at(leading_system);

    let system_prompt = if system_messages.is_empty() {
        None
    } else {
        Some(
            system_messages
                .iter()
                .map(ChatMessage::text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    let prompt = render_prompt(history, conversation);

    let tools: Vec<ToolSchema> = request
        .tools
        .iter()
        .flatten()
        .map(|t| ToolSchema {
            name: t.function.name.clone(),
            description: t.function.description.clone(),
            parameters: t
                .function
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        })
        .collect();

    let tool_choice = match &validated.tool_choice {
        ToolChoice::Auto => claude_client::ToolChoice::Auto,
        ToolChoice::None => claude_client::ToolChoice::None,
        ToolChoice::Function(name) => claude_client::ToolChoice::Function(name.clone()),
    };

    let options = InvokeOptions {
        model: request.model.clone(),
        system_prompt,
        max_turns: overrides.max_turns.unwrap_or(2),
        tools,
        tool_choice,
        permission_mode: overrides.permission_mode.unwrap_or_default(),
        max_thinking_tokens: overrides.max_thinking_tokens.unwrap_or(0),
        resume_session_id: None,
        cwd: None,
        env_overrides,
        timeout_ms,
    };

    Invocation { prompt, options }
}

/// Render the conversation as a prompt.
///
/// The single-message fast path hands the user's text through untouched;
/// anything longer becomes a bracketed transcript the model is told to
/// continue.
fn render_prompt(history: &[ChatMessage], conversation: &[ChatMessage]) -> String {
    if history.is_empty() && conversation.len() == 1 && conversation[0].role == Role::User {
        return conversation[0].text().to_string();
    }

    let rendered: Vec<String> = history
        .iter()
        .chain(conversation.iter())
        .map(render_message)
        .collect();

    format!(
        "Below is the conversation so far. Continue it naturally: reply ONLY \
         as the Assistant to the last User message.\n\n{}",
        rendered.join("\n\n")
    )
}

fn render_message(msg: &ChatMessage) -> String {
    match msg.role {
        Role::User => format!("[User]: {}", msg.text()),
        Role::Assistant => {
            let mut text = format!("[Assistant]: {}", msg.text());
            for call in msg.tool_calls.iter().flatten() {
                text.push_str(&format!(
                    "\n[Called tool: {}({})]",
                    call.function.name, call.function.arguments
                ));
            }
            text
        }
        // Tool results carry their call id so the model can attribute them.
        Role::Tool => format!(
            "[Tool Result ({})]: {}",
            msg.tool_call_id.as_deref().unwrap_or("unknown"),
            msg.text()
        ),
        // Non-leading system messages stay in-band as events.
        Role::System => format!("[System Event]: {}", msg.text()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use claude_client::PermissionMode;
    use gateway_core::validate::validate_request;
    use serde_json::json;

    fn validated(body: serde_json::Value) -> ValidatedRequest {
        validate_request(&body).expect("fixture request must validate")
    }

    fn invoke(body: serde_json::Value, history: &[ChatMessage]) -> Invocation {
        build_invocation(
            &validated(body),
            &HeaderOverrides::default(),
            history,
            HashMap::new(),
            600_000,
        )
    }

    #[test]
    fn single_user_message_passes_through_bare() {
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "ping"}]
            }),
            &[],
        );
        assert_eq!(inv.prompt, "ping");
        assert!(inv.options.system_prompt.is_none());
        assert_eq!(inv.options.max_turns, 2);
        assert_eq!(inv.options.permission_mode, PermissionMode::Default);
    }

    #[test]
    fn leading_system_messages_join_with_blank_line() {
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "system", "content": "answer in french"},
                    {"role": "user", "content": "hello"}
                ]
            }),
            &[],
        );
        assert_eq!(
            inv.options.system_prompt.as_deref(),
            Some("be terse\n\nanswer in french")
        );
        assert_eq!(inv.prompt, "hello");
    }

    #[test]
    fn session_history_is_prepended_in_order() {
        let history = vec![
            ChatMessage::user("my name is Alice"),
            ChatMessage::assistant(Some("ok".into()), None),
        ];
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "what is my name?"}]
            }),
            &history,
        );
        let alice = inv.prompt.find("my name is Alice").expect("history present");
        let ok = inv.prompt.find("[Assistant]: ok").expect("reply present");
        let question = inv.prompt.find("what is my name?").expect("new turn present");
        assert!(alice < ok && ok < question);
    }

    #[test]
    fn tool_results_render_with_their_call_id() {
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [
                    {"role": "user", "content": "read it"},
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "c1", "type": "function",
                         "function": {"name": "read_file", "arguments": "{\"path\":\"/f\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "c1", "content": "file body"}
                ]
            }),
            &[],
        );
        assert!(inv.prompt.contains("[Called tool: read_file({\"path\":\"/f\"})]"));
        assert!(inv.prompt.contains("[Tool Result (c1)]: file body"));
    }

    #[test]
    fn mid_conversation_system_messages_become_events() {
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "system", "content": "the user went idle"},
                    {"role": "user", "content": "back"}
                ]
            }),
            &[],
        );
        assert!(inv.prompt.contains("[System Event]: the user went idle"));
        assert!(inv.options.system_prompt.is_none());
    }

    #[test]
    fn header_overrides_take_effect() {
        let overrides = HeaderOverrides {
            max_turns: Some(7),
            permission_mode: Some(PermissionMode::BypassPermissions),
            max_thinking_tokens: Some(2048),
        };
        let inv = build_invocation(
            &validated(json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "hi"}]
            })),
            &overrides,
            &[],
            HashMap::new(),
            1_000,
        );
        assert_eq!(inv.options.max_turns, 7);
        assert_eq!(inv.options.permission_mode, PermissionMode::BypassPermissions);
        assert_eq!(inv.options.max_thinking_tokens, 2048);
        assert_eq!(inv.options.timeout_ms, 1_000);
    }

    #[test]
    fn tool_schemas_carry_through() {
        let inv = invoke(
            json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "read_file",
                        "description": "Read a file",
                        "parameters": {"type": "object", "properties": {"path": {"type": "string"}}}
                    }
                }],
                "tool_choice": {"type": "function", "function": {"name": "read_file"}}
            }),
            &[],
        );
        assert_eq!(inv.options.tools.len(), 1);
        assert_eq!(inv.options.tools[0].name, "read_file");
        assert_eq!(
            inv.options.tool_choice,
            claude_client::ToolChoice::Function("read_file".into())
        );
    }
}
