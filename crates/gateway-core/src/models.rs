//! The closed set of Claude model identifiers this gateway accepts.

use crate::openai::{ModelInfo, ModelList};

/// Additions require a code change; requests naming anything else fail
/// validation.
pub const ALLOWED_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
];

pub fn is_allowed(model: &str) -> bool {
    ALLOWED_MODELS.contains(&model)
}

/// The static `/v1/models` payload.
pub fn model_list() -> ModelList {
    ModelList {
        object: "list",
        data: ALLOWED_MODELS
            .iter()
            .map(|id| ModelInfo {
                id: (*id).to_string(),
                object: "model",
                owned_by: "anthropic",
            })
            .collect(),
    }
}
