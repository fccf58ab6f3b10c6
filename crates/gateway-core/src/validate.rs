//! Request-shape validation and the compatibility report.
//!
//! Works on the raw JSON body so every violation can be reported per field
//! with its kind, instead of surfacing whatever serde rejects first.

use serde::Serialize;
use serde_json::Value;

use claude_client::PermissionMode;

use crate::error::{FieldError, GatewayError, Result, ViolationKind};
use crate::models;
use crate::openai::{ChatRequest, ToolChoice};

/// OpenAI parameters the gateway honors.
pub const SUPPORTED_PARAMETERS: &[&str] = &[
    "model",
    "messages",
    "stream",
    "session_id",
    "tools",
    "tool_choice",
    "user",
];

/// OpenAI parameters accepted on the wire, reported, and discarded — the
/// Claude CLI does not honor them.
pub const UNSUPPORTED_PARAMETERS: &[&str] = &[
    "temperature",
    "top_p",
    "n",
    "max_tokens",
    "stop",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
];

/// Which parameters of a given request the gateway honors, ignores, or
/// warns about. Surfaced verbatim from `/v1/compatibility` and
/// `/v1/debug/request`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompatibilityReport {
    pub supported_parameters: Vec<String>,
    pub unsupported_parameters: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// A request that passed shape validation.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub request: ChatRequest,
    pub tool_choice: ToolChoice,
    pub report: CompatibilityReport,
}

// ---------------------------------------------------------------------------
// Body validation
// ---------------------------------------------------------------------------

/// Validate an OpenAI chat request body.
///
/// Returns every violation at once; the compatibility report is produced
/// even for fields that are accepted-and-discarded.
pub fn validate_request(body: &Value) -> Result<ValidatedRequest> {
    let Some(obj) = body.as_object() else {
        return Err(GatewayError::validation(vec![FieldError::new(
            "body",
            ViolationKind::TypeMismatch,
            "request body must be a JSON object",
        )]));
    };

    let mut errors = Vec::new();

    check_model(obj, &mut errors);
    check_messages(obj, &mut errors);
    check_stream(obj, &mut errors);
    check_n(obj, &mut errors);
    check_opt_string(obj, "session_id", &mut errors);
    check_opt_string(obj, "user", &mut errors);
    check_tools(obj, &mut errors);
    let tool_choice = check_tool_choice(obj, &mut errors);

    if !errors.is_empty() {
        return Err(GatewayError::validation(errors));
    }

    let report = build_report(obj);

    // Shape is verified above, so typed deserialization cannot fail on the
    // checked fields.
    let request: ChatRequest = serde_json::from_value(body.clone())
        .map_err(|e| GatewayError::Internal(format!("post-validation decode failed: {e}")))?;

    Ok(ValidatedRequest {
        request,
        tool_choice,
        report,
    })
}

fn check_model(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    match obj.get("model") {
        None | Some(Value::Null) => errors.push(FieldError::new(
            "model",
            ViolationKind::Missing,
            "model is required",
        )),
        Some(Value::String(s)) if s.is_empty() => errors.push(FieldError::new(
            "model",
            ViolationKind::ValueOutOfRange,
            "model must be non-empty",
        )),
        Some(Value::String(s)) if !models::is_allowed(s) => errors.push(FieldError::new(
            "model",
            ViolationKind::EnumViolation,
            format!(
                "unknown model '{s}'; known models: {}",
                models::ALLOWED_MODELS.join(", ")
            ),
        )),
        Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(
            "model",
            ViolationKind::TypeMismatch,
            "model must be a string",
        )),
    }
}

fn check_messages(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    let messages = match obj.get("messages") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(
                "messages",
                ViolationKind::Missing,
                "messages is required",
            ));
            return;
        }
        Some(Value::Array(arr)) => arr,
        Some(_) => {
            errors.push(FieldError::new(
                "messages",
                ViolationKind::TypeMismatch,
                "messages must be an array",
            ));
            return;
        }
    };

    if messages.is_empty() {
        errors.push(FieldError::new(
            "messages",
            ViolationKind::ValueOutOfRange,
            "messages must not be empty",
        ));
        return;
    }

    for (i, msg) in messages.iter().enumerate() {
        check_message(i, msg, errors);
    }
}

fn check_message(i: usize, msg: &Value, errors: &mut Vec<FieldError>) {
    let Some(obj) = msg.as_object() else {
        errors.push(FieldError::new(
            format!("messages[{i}]"),
            ViolationKind::TypeMismatch,
            "message must be an object",
        ));
        return;
    };

    let role = match obj.get("role").and_then(Value::as_str) {
        Some(r @ ("system" | "user" | "assistant" | "tool")) => r,
        Some(other) => {
            errors.push(FieldError::new(
                format!("messages[{i}].role"),
                ViolationKind::EnumViolation,
                format!("unknown role '{other}'"),
            ));
            return;
        }
        None => {
            errors.push(FieldError::new(
                format!("messages[{i}].role"),
                ViolationKind::Missing,
                "role is required",
            ));
            return;
        }
    };

    match obj.get("content") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(
            format!("messages[{i}].content"),
            ViolationKind::TypeMismatch,
            "content must be a string or null",
        )),
    }

    if role == "tool" && obj.get("tool_call_id").and_then(Value::as_str).is_none() {
        errors.push(FieldError::new(
            format!("messages[{i}].tool_call_id"),
            ViolationKind::Missing,
            "tool messages require tool_call_id",
        ));
    }

    if role == "assistant" {
        let has_calls = obj
            .get("tool_calls")
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty());
        let has_content = matches!(obj.get("content"), Some(Value::String(_)));
        if has_calls && has_content {
            errors.push(FieldError::new(
                format!("messages[{i}].content"),
                ViolationKind::ValueOutOfRange,
                "assistant messages with tool_calls must have null content",
            ));
        }
    }
}

fn check_stream(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    match obj.get("stream") {
        None | Some(Value::Null) | Some(Value::Bool(_)) => {}
        Some(_) => errors.push(FieldError::new(
            "stream",
            ViolationKind::TypeMismatch,
            "stream must be a boolean",
        )),
    }
}

fn check_n(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    match obj.get("n") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) if n.as_u64() == Some(1) => {}
        Some(Value::Number(_)) => errors.push(FieldError::new(
            "n",
            ViolationKind::ValueOutOfRange,
            "only n=1 is supported",
        )),
        Some(_) => errors.push(FieldError::new(
            "n",
            ViolationKind::TypeMismatch,
            "n must be an integer",
        )),
    }
}

fn check_opt_string(obj: &serde_json::Map<String, Value>, field: &str, errors: &mut Vec<FieldError>) {
    match obj.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(
            field,
            ViolationKind::TypeMismatch,
            format!("{field} must be a string"),
        )),
    }
}

fn check_tools(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    let tools = match obj.get("tools") {
        None | Some(Value::Null) => return,
        Some(Value::Array(arr)) => arr,
        Some(_) => {
            errors.push(FieldError::new(
                "tools",
                ViolationKind::TypeMismatch,
                "tools must be an array",
            ));
            return;
        }
    };

    for (i, tool) in tools.iter().enumerate() {
        let tool_type = tool.get("type").and_then(Value::as_str);
        if tool_type != Some("function") {
            errors.push(FieldError::new(
                format!("tools[{i}].type"),
                ViolationKind::EnumViolation,
                "only 'function' tools are supported",
            ));
        }
        if tool
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map_or(true, str::is_empty)
        {
            errors.push(FieldError::new(
                format!("tools[{i}].function.name"),
                ViolationKind::Missing,
                "function name is required",
            ));
        }
    }
}

fn check_tool_choice(obj: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) -> ToolChoice {
    match obj.get("tool_choice") {
        None | Some(Value::Null) => ToolChoice::Auto,
        Some(Value::String(s)) => match s.as_str() {
            "auto" => ToolChoice::Auto,
            "none" => ToolChoice::None,
            other => {
                errors.push(FieldError::new(
                    "tool_choice",
                    ViolationKind::EnumViolation,
                    format!("unknown tool_choice '{other}'"),
                ));
                ToolChoice::Auto
            }
        },
        Some(Value::Object(choice)) => {
            match choice
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
            {
                Some(name) if !name.is_empty() => ToolChoice::Function(name.to_string()),
                _ => {
                    errors.push(FieldError::new(
                        "tool_choice.function.name",
                        ViolationKind::Missing,
                        "forced tool_choice requires function.name",
                    ));
                    ToolChoice::Auto
                }
            }
        }
        Some(_) => {
            errors.push(FieldError::new(
                "tool_choice",
                ViolationKind::TypeMismatch,
                "tool_choice must be 'auto', 'none', or an object",
            ));
            ToolChoice::Auto
        }
    }
}

// ---------------------------------------------------------------------------
// Compatibility report
// ---------------------------------------------------------------------------

/// Report on any body, valid or not. Non-object bodies get an empty report.
pub fn compatibility_report(body: &Value) -> CompatibilityReport {
    body.as_object().map(build_report).unwrap_or_default()
}

fn build_report(obj: &serde_json::Map<String, Value>) -> CompatibilityReport {
    let mut report = CompatibilityReport::default();

    for param in SUPPORTED_PARAMETERS {
        if obj.contains_key(*param) {
            report.supported_parameters.push((*param).to_string());
        }
    }
    for param in UNSUPPORTED_PARAMETERS {
        if obj.contains_key(*param) {
            report.unsupported_parameters.push((*param).to_string());
            report.warnings.push(format!(
                "'{param}' is accepted but ignored; the Claude CLI does not honor it"
            ));
        }
    }
    for key in obj.keys() {
        if !SUPPORTED_PARAMETERS.contains(&key.as_str())
            && !UNSUPPORTED_PARAMETERS.contains(&key.as_str())
        {
            report
                .warnings
                .push(format!("unknown parameter '{key}' ignored"));
        }
    }

    if report
        .unsupported_parameters
        .iter()
        .any(|p| p == "temperature" || p == "top_p")
    {
        report.suggestions.push(
            "Sampling is controlled by the Claude CLI; remove temperature/top_p.".to_string(),
        );
    }
    if report.unsupported_parameters.iter().any(|p| p == "max_tokens") {
        report.suggestions.push(
            "Bound work with the X-Claude-Max-Turns header instead of max_tokens.".to_string(),
        );
    }
    if !obj.contains_key("session_id") {
        report.suggestions.push(
            "Set session_id to let the gateway preserve conversation context server-side."
                .to_string(),
        );
    }

    report
}

// ---------------------------------------------------------------------------
// Header overrides
// ---------------------------------------------------------------------------

pub const HEADER_MAX_TURNS: &str = "x-claude-max-turns";
pub const HEADER_PERMISSION_MODE: &str = "x-claude-permission-mode";
pub const HEADER_MAX_THINKING_TOKENS: &str = "x-claude-max-thinking-tokens";

/// Per-request overrides parsed from `X-Claude-*` headers.
///
/// Headers win over any conflicting body field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverrides {
    pub max_turns: Option<u32>,
    pub permission_mode: Option<PermissionMode>,
    pub max_thinking_tokens: Option<u32>,
}

impl HeaderOverrides {
    /// Parse raw header values (already matched case-insensitively by the
    /// HTTP layer). Malformed values are validation errors.
    pub fn parse(
        max_turns: Option<&str>,
        permission_mode: Option<&str>,
        max_thinking_tokens: Option<&str>,
    ) -> Result<Self> {
        let mut errors = Vec::new();
        let mut overrides = HeaderOverrides::default();

        if let Some(raw) = max_turns {
            match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => overrides.max_turns = Some(n),
                Ok(_) => errors.push(FieldError::new(
                    HEADER_MAX_TURNS,
                    ViolationKind::ValueOutOfRange,
                    "max turns must be at least 1",
                )),
                Err(_) => errors.push(FieldError::new(
                    HEADER_MAX_TURNS,
                    ViolationKind::TypeMismatch,
                    "max turns must be an integer",
                )),
            }
        }

        if let Some(raw) = permission_mode {
            match PermissionMode::parse(raw.trim()) {
                Some(mode) => overrides.permission_mode = Some(mode),
                None => errors.push(FieldError::new(
                    HEADER_PERMISSION_MODE,
                    ViolationKind::EnumViolation,
                    "permission mode must be default, acceptEdits, or bypassPermissions",
                )),
            }
        }

        if let Some(raw) = max_thinking_tokens {
            match raw.trim().parse::<u32>() {
                Ok(n) => overrides.max_thinking_tokens = Some(n),
                Err(_) => errors.push(FieldError::new(
                    HEADER_MAX_THINKING_TOKENS,
                    ViolationKind::TypeMismatch,
                    "max thinking tokens must be an integer",
                )),
            }
        }

        if errors.is_empty() {
            Ok(overrides)
        } else {
            Err(GatewayError::validation(errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(err: GatewayError) -> Vec<FieldError> {
        match err {
            GatewayError::Validation { details } => details,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn minimal_valid_request_passes() {
        let body = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "ping"}]
        });
        let validated = validate_request(&body).unwrap();
        assert_eq!(validated.request.model, "claude-3-5-haiku-20241022");
        assert!(!validated.request.stream);
        assert_eq!(validated.tool_choice, ToolChoice::Auto);
        assert!(validated.report.unsupported_parameters.is_empty());
    }

    #[test]
    fn missing_model_and_messages_are_both_reported() {
        let errs = details(validate_request(&json!({"stream": true})).unwrap_err());
        let fields: Vec<_> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"model"));
        assert!(fields.contains(&"messages"));
        assert!(errs.iter().all(|e| e.kind == ViolationKind::Missing));
    }

    #[test]
    fn unknown_model_is_enum_violation() {
        let errs = details(
            validate_request(&json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .unwrap_err(),
        );
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ViolationKind::EnumViolation);
    }

    #[test]
    fn empty_messages_is_out_of_range() {
        let errs = details(
            validate_request(&json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": []
            }))
            .unwrap_err(),
        );
        assert_eq!(errs[0].field, "messages");
        assert_eq!(errs[0].kind, ViolationKind::ValueOutOfRange);
    }

    #[test]
    fn tool_message_requires_tool_call_id() {
        let errs = details(
            validate_request(&json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "tool", "content": "result"}
                ]
            }))
            .unwrap_err(),
        );
        assert_eq!(errs[0].field, "messages[1].tool_call_id");
        assert_eq!(errs[0].kind, ViolationKind::Missing);
    }

    #[test]
    fn assistant_with_tool_calls_must_have_null_content() {
        let errs = details(
            validate_request(&json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{
                    "role": "assistant",
                    "content": "text",
                    "tool_calls": [{"id": "c1", "type": "function",
                                    "function": {"name": "f", "arguments": "{}"}}]
                }]
            }))
            .unwrap_err(),
        );
        assert_eq!(errs[0].field, "messages[0].content");
    }

    #[test]
    fn n_must_equal_one() {
        let base = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let mut ok = base.clone();
        ok["n"] = json!(1);
        assert!(validate_request(&ok).is_ok());

        let mut bad = base;
        bad["n"] = json!(3);
        let errs = details(validate_request(&bad).unwrap_err());
        assert_eq!(errs[0].field, "n");
        assert_eq!(errs[0].kind, ViolationKind::ValueOutOfRange);
    }

    #[test]
    fn unsupported_parameters_are_exactly_the_provided_intersection() {
        let body = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "max_tokens": 100,
            "frequency_penalty": 0.5
        });
        let validated = validate_request(&body).unwrap();
        assert_eq!(
            validated.report.unsupported_parameters,
            vec!["temperature", "max_tokens", "frequency_penalty"]
        );
        assert_eq!(validated.report.warnings.len(), 3);
    }

    #[test]
    fn forced_tool_choice_parses() {
        let body = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": {"type": "function", "function": {"name": "read_file"}}
        });
        let validated = validate_request(&body).unwrap();
        assert_eq!(validated.tool_choice, ToolChoice::Function("read_file".into()));
    }

    #[test]
    fn bad_tool_choice_string_is_enum_violation() {
        let errs = details(
            validate_request(&json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "hi"}],
                "tool_choice": "required"
            }))
            .unwrap_err(),
        );
        assert_eq!(errs[0].kind, ViolationKind::EnumViolation);
    }

    #[test]
    fn non_object_body_is_rejected() {
        let errs = details(validate_request(&json!([1, 2, 3])).unwrap_err());
        assert_eq!(errs[0].field, "body");
    }

    #[test]
    fn header_overrides_parse_and_bound() {
        let overrides = HeaderOverrides::parse(Some("5"), Some("acceptEdits"), Some("1024")).unwrap();
        assert_eq!(overrides.max_turns, Some(5));
        assert_eq!(overrides.permission_mode, Some(PermissionMode::AcceptEdits));
        assert_eq!(overrides.max_thinking_tokens, Some(1024));

        assert!(HeaderOverrides::parse(Some("0"), None, None).is_err());
        assert!(HeaderOverrides::parse(Some("abc"), None, None).is_err());
        assert!(HeaderOverrides::parse(None, Some("yolo"), None).is_err());
        assert_eq!(
            HeaderOverrides::parse(None, None, None).unwrap(),
            HeaderOverrides::default()
        );
    }
}
