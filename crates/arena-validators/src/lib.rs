use arena_core::errors::ConfigError;
use serde_json::Value;

pub mod content;
pub mod cost;
pub mod json_checks;
pub mod judge;
pub mod registry;
pub mod tool_args;
pub mod tool_checks;
pub mod verdict;
pub mod workflow;

pub use registry::{AssertionOutcome, BuiltSuite, ValidatorRegistry};

/// Builds a validator from its raw params object.
///
/// Shape errors (wrong types, negative counts) fail here. Semantic errors such
/// as an uncompilable regex are kept and reported when the validator runs.
pub trait FromParams: Sized {
    fn from_params(params: &Value) -> Result<Self, ConfigError>;
}
