//! `gateway-core` — domain types for the OpenAI-compatible Claude gateway.
//!
//! Holds everything the HTTP layer and the completion service share but
//! that has no I/O of its own: the OpenAI wire model, request validation
//! with per-field failure reporting, the compatibility report, the model
//! allowlist, the error taxonomy, and configuration.

pub mod config;
pub mod error;
pub mod models;
pub mod openai;
pub mod validate;

pub use config::GatewayConfig;
pub use error::{FieldError, GatewayError, Result, ViolationKind};
pub use validate::{CompatibilityReport, HeaderOverrides, ValidatedRequest};
