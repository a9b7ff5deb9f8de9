use crate::errors::{compile_regex, ConfigError};
use crate::params::string_list;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration shape of one dependency-chain step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStepConfig {
    pub tool: String,
    #[serde(default, deserialize_with = "string_list")]
    pub result_includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_matches: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args_match: BTreeMap<String, String>,
    #[serde(default)]
    pub no_error: bool,
}

/// A compiled chain step. Immutable once built.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub tool: String,
    pub result_includes: Vec<String>,
    pub result_matches: Option<Regex>,
    /// Argument name -> pattern, ordered by argument name.
    pub args_match: Vec<(String, Regex)>,
    pub no_error: bool,
}

impl ChainStep {
    pub fn compile(cfg: &ChainStepConfig) -> Result<Self, ConfigError> {
        if cfg.tool.is_empty() {
            return Err(ConfigError::MissingParam("steps[].tool".into()));
        }
        let result_matches = match cfg.result_matches.as_deref() {
            Some(p) if !p.is_empty() => Some(compile_regex(p)?),
            _ => None,
        };
        let args_match = cfg
            .args_match
            .iter()
            .map(|(arg, p)| compile_regex(p).map(|re| (arg.clone(), re)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tool: cfg.tool.clone(),
            result_includes: cfg.result_includes.clone(),
            result_matches,
            args_match,
            no_error: cfg.no_error,
        })
    }

    pub fn simple(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            result_includes: Vec::new(),
            result_matches: None,
            args_match: Vec::new(),
            no_error: false,
        }
    }
}

/// Compiles every step, failing on the first invalid pattern.
pub fn compile_steps(cfgs: &[ChainStepConfig]) -> Result<Vec<ChainStep>, ConfigError> {
    cfgs.iter().map(ChainStep::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_config_shape() {
        let cfg: ChainStepConfig = serde_json::from_value(json!({
            "tool": "process_refund",
            "result_includes": ["done"],
            "result_matches": "^d",
            "args_match": {"order_id": "ORD-\\d+"},
            "no_error": true
        }))
        .unwrap();
        let step = ChainStep::compile(&cfg).unwrap();
        assert_eq!(step.args_match.len(), 1);
        assert!(step.result_matches.is_some());
        assert!(step.no_error);
    }

    #[test]
    fn test_only_tool_is_required() {
        let cfg: ChainStepConfig = serde_json::from_value(json!({"tool": "a"})).unwrap();
        let step = ChainStep::compile(&cfg).unwrap();
        assert!(step.result_includes.is_empty());
        assert!(serde_json::from_value::<ChainStepConfig>(json!({"no_error": true})).is_err());
    }

    #[test]
    fn test_invalid_arg_pattern_is_config_error() {
        let cfg: ChainStepConfig =
            serde_json::from_value(json!({"tool": "a", "args_match": {"q": "[bad"}})).unwrap();
        let err = ChainStep::compile(&cfg).unwrap_err();
        assert_eq!(err.kind(), "invalid_regex");
    }
}
