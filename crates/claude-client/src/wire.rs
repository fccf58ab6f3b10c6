//! Raw `claude --output-format stream-json` vocabulary and its mapping to
//! [`ClaudeEvent`]. The exact field names here track the installed CLI; this
//! module is the only place that deals with them.

use serde::Deserialize;

use crate::types::{ClaudeEvent, EndReason, FailureKind};

// ─── Raw message types ────────────────────────────────────────────────────

/// Every line emitted by the CLI, discriminated by the JSON `"type"` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamMessage {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    /// Partial assistant chunks (`--include-partial-messages`).
    StreamEvent(StreamEventMessage),
    Result(ResultMessage),
    /// Any future message type — safe to skip.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SystemMessage {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserMessage {
    #[serde(default)]
    #[allow(dead_code)]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AssistantMessage {
    pub message: AssistantContent,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AssistantContent {
    pub content: Vec<ContentBlock>,
}

/// Content blocks within a complete assistant message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamEventMessage {
    pub event: StreamEventPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamEventPayload {
    ContentBlockStart { content_block: ContentBlock },
    ContentBlockDelta { delta: BlockDelta },
    ContentBlockStop {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

/// `type = "result"` — the terminal line of every invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub(crate) enum ResultMessage {
    Success(ResultSuccess),
    ErrorDuringExecution(ResultError),
    ErrorMaxTurns(ResultError),
    #[serde(other)]
    UnknownFailure,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultSuccess {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ResultUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultError {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub usage: Option<ResultUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ─── Event mapper ─────────────────────────────────────────────────────────

/// Stateful raw-message → [`ClaudeEvent`] translator.
///
/// When the CLI streams partial chunks it ALSO emits the complete assistant
/// message afterwards; the mapper tracks whether deltas were seen for the
/// current turn and drops the redundant full blocks.
#[derive(Debug, Default)]
pub(crate) struct EventMapper {
    saw_partial: bool,
    /// Tool-use block currently receiving `input_json_delta` fragments.
    open_tool: Option<String>,
}

impl EventMapper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn map(&mut self, raw: StreamMessage) -> Vec<ClaudeEvent> {
        match raw {
            StreamMessage::System(sys) => {
                tracing::debug!(session_id = %sys.session_id, "claude session started");
                Vec::new()
            }
            StreamMessage::User(_) | StreamMessage::Unknown => Vec::new(),
            StreamMessage::StreamEvent(ev) => self.map_stream_event(ev.event),
            StreamMessage::Assistant(msg) => self.map_assistant(msg),
            StreamMessage::Result(result) => self.map_result(result),
        }
    }

    fn map_stream_event(&mut self, payload: StreamEventPayload) -> Vec<ClaudeEvent> {
        match payload {
            StreamEventPayload::ContentBlockStart { content_block } => match content_block {
                ContentBlock::ToolUse { id, name, .. } => {
                    self.saw_partial = true;
                    self.open_tool = Some(id.clone());
                    vec![ClaudeEvent::ToolUse {
                        id,
                        name: Some(name),
                        partial_arguments: String::new(),
                    }]
                }
                // Text/thinking starts carry no content yet.
                _ => {
                    self.saw_partial = true;
                    Vec::new()
                }
            },
            StreamEventPayload::ContentBlockDelta { delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    self.saw_partial = true;
                    vec![ClaudeEvent::TextDelta { text }]
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    self.saw_partial = true;
                    match &self.open_tool {
                        Some(id) => vec![ClaudeEvent::ToolUse {
                            id: id.clone(),
                            name: None,
                            partial_arguments: partial_json,
                        }],
                        // Delta without a preceding block start — drop it.
                        None => Vec::new(),
                    }
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    self.saw_partial = true;
                    vec![ClaudeEvent::Thinking { text: thinking }]
                }
                BlockDelta::Other => Vec::new(),
            },
            StreamEventPayload::ContentBlockStop {} => {
                self.open_tool = None;
                Vec::new()
            }
            StreamEventPayload::Other => Vec::new(),
        }
    }

    fn map_assistant(&mut self, msg: AssistantMessage) -> Vec<ClaudeEvent> {
        if self.saw_partial {
            // Already delivered incrementally via stream events.
            self.saw_partial = false;
            return Vec::new();
        }
        msg.message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(ClaudeEvent::TextDelta { text }),
                ContentBlock::ToolUse { id, name, input } => Some(ClaudeEvent::ToolUse {
                    id,
                    name: Some(name),
                    partial_arguments: input.to_string(),
                }),
                ContentBlock::Thinking { thinking } => {
                    Some(ClaudeEvent::Thinking { text: thinking })
                }
                ContentBlock::Other => None,
            })
            .collect()
    }

    fn map_result(&mut self, result: ResultMessage) -> Vec<ClaudeEvent> {
        let mut events = Vec::with_capacity(2);
        match result {
            ResultMessage::Success(r) => {
                if let Some(usage) = r.usage {
                    events.push(ClaudeEvent::Usage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: usage.output_tokens,
                    });
                }
                events.push(ClaudeEvent::End {
                    reason: end_reason(r.stop_reason.as_deref()),
                });
            }
            // The turn cap is a length-style truncation, not a failure.
            ResultMessage::ErrorMaxTurns(r) => {
                if let Some(usage) = r.usage {
                    events.push(ClaudeEvent::Usage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: usage.output_tokens,
                    });
                }
                events.push(ClaudeEvent::End {
                    reason: EndReason::Length,
                });
            }
            ResultMessage::ErrorDuringExecution(r) => {
                let message = if r.errors.is_empty() {
                    "execution error".to_string()
                } else {
                    r.errors.join("; ")
                };
                events.push(ClaudeEvent::Error {
                    kind: FailureKind::SubprocessFailure,
                    message,
                });
            }
            ResultMessage::UnknownFailure => {
                events.push(ClaudeEvent::Error {
                    kind: FailureKind::SubprocessFailure,
                    message: "unrecognized result subtype".to_string(),
                });
            }
        }
        events
    }
}

fn end_reason(stop_reason: Option<&str>) -> EndReason {
    match stop_reason {
        Some("tool_use") => EndReason::ToolCalls,
        Some("max_tokens") => EndReason::Length,
        // `end_turn`, `stop_sequence`, absent, or anything new.
        _ => EndReason::Stop,
    }
}
