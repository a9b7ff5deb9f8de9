use arena_core::errors::ConfigError;
use arena_core::validator_api::{ConversationResult, ValidationResult};
use serde_json::Value;

/// Check outcome shared by the turn and conversation wrappers.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub message: String,
    pub details: Value,
}

impl Verdict {
    pub fn pass(message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details,
        }
    }

    pub fn fail(message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details,
        }
    }

    pub fn config_error(err: &ConfigError) -> Self {
        Self::fail(err.to_string(), err.to_details())
    }

    pub fn check(passed: bool, ok: impl Into<String>, failed: impl Into<String>, details: Value) -> Self {
        if passed {
            Self::pass(ok, details)
        } else {
            Self::fail(failed, details)
        }
    }

    pub fn into_turn(self) -> ValidationResult {
        let mut details = self.details;
        if let Value::Object(map) = &mut details {
            map.entry("message").or_insert(Value::String(self.message));
        }
        if self.passed {
            ValidationResult::pass(details)
        } else {
            ValidationResult::fail(details)
        }
    }

    pub fn into_conversation(self) -> ConversationResult {
        if self.passed {
            ConversationResult::pass(self.message, self.details)
        } else {
            ConversationResult::fail(self.message, self.details)
        }
    }
}
