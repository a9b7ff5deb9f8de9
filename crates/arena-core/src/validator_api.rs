use crate::agent_assertions::ConversationContext;
use crate::errors::ConfigError;
use crate::params::TurnParams;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Skip reason used when the host did not supply `_turn_messages`.
pub const SKIP_TURN_TRACE_UNAVAILABLE: &str = "turn_trace_unavailable";

/// Outcome of a turn-level check.
///
/// `skipped` results are always `passed`: the check could not run here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub details: Value,
}

impl ValidationResult {
    pub fn pass(details: Value) -> Self {
        Self {
            passed: true,
            skipped: false,
            details: object_or_empty(details),
        }
    }

    pub fn fail(details: Value) -> Self {
        Self {
            passed: false,
            skipped: false,
            details: object_or_empty(details),
        }
    }

    pub fn skip(reason: &str) -> Self {
        Self {
            passed: true,
            skipped: true,
            details: json!({ "skip_reason": reason }),
        }
    }

    /// A failed result carrying the typed config error details.
    pub fn config_error(err: &ConfigError) -> Self {
        Self::fail(err.to_details())
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.details.get("skip_reason").and_then(Value::as_str)
    }
}

fn object_or_empty(v: Value) -> Value {
    match v {
        Value::Object(_) => v,
        Value::Null => Value::Object(Map::new()),
        other => json!({ "value": other }),
    }
}

/// A check run against a single assistant turn.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, content: &str, params: &TurnParams) -> ValidationResult;
}

/// Outcome of a conversation-level check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationResult {
    pub passed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub message: String,
    pub details: Value,
}

impl ConversationResult {
    pub fn pass(message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: true,
            skipped: false,
            message: message.into(),
            details: object_or_empty(details),
        }
    }

    pub fn fail(message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: false,
            skipped: false,
            message: message.into(),
            details: object_or_empty(details),
        }
    }

    pub fn config_error(err: &ConfigError) -> Self {
        Self::fail(err.to_string(), err.to_details())
    }
}

/// A check over a whole conversation. Async because some implementations
/// call out to a judge.
#[async_trait]
pub trait ConversationValidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult>;
}
