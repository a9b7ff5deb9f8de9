use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::agent_assertions::matchers::{check_exact_args, check_pattern_args, missing_substrings};
use arena_core::errors::{compile_regex, ConfigError};
use arena_core::model::MessageToolCall;
use arena_core::params::{parse_config, string_list, TurnParams};
use arena_core::trace::{resolve_turn_trace, turn_tool_calls, TurnToolCall};
use arena_core::validator_api::{ValidationResult, Validator, SKIP_TURN_TRACE_UNAVAILABLE};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ToolCallsWithArgsConfig {
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    expected_args: BTreeMap<String, Value>,
    #[serde(default)]
    args_match: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_list")]
    result_includes: Vec<String>,
    #[serde(default)]
    result_matches: Option<String>,
    #[serde(default)]
    no_error: bool,
}

struct Patterns {
    args: Vec<(String, Regex)>,
    result: Option<Regex>,
}

/// Checks that a tool was called with the expected arguments and, when the
/// turn trace is available, that its results satisfy the result constraints.
pub struct ToolCallsWithArgs {
    tool_name: Option<String>,
    expected_args: BTreeMap<String, Value>,
    patterns: Result<Patterns, ConfigError>,
    result_includes: Vec<String>,
    no_error: bool,
}

impl FromParams for ToolCallsWithArgs {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ToolCallsWithArgsConfig = parse_config("tool_calls_with_args", params)?;
        let patterns = compile_patterns(&cfg.args_match, cfg.result_matches.as_deref());
        Ok(Self {
            tool_name: cfg.tool_name.filter(|t| !t.is_empty()),
            expected_args: cfg.expected_args,
            patterns,
            result_includes: cfg.result_includes,
            no_error: cfg.no_error,
        })
    }
}

fn compile_patterns(
    args_match: &BTreeMap<String, String>,
    result_matches: Option<&str>,
) -> Result<Patterns, ConfigError> {
    let args = args_match
        .iter()
        .map(|(arg, p)| compile_regex(p).map(|re| (arg.clone(), re)))
        .collect::<Result<Vec<_>, _>>()?;
    let result = match result_matches {
        Some(p) if !p.is_empty() => Some(compile_regex(p)?),
        _ => None,
    };
    Ok(Patterns { args, result })
}

/// Parses call arguments. Empty or `null` payloads are an empty object.
fn parse_args(call: &MessageToolCall) -> Result<Map<String, Value>, Value> {
    if call.args.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&call.args) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(ConfigError::InvalidArgsJson {
            tool: call.name.clone(),
            message: format!("expected a JSON object, got {}", other),
        }),
        Err(e) => Err(ConfigError::InvalidArgsJson {
            tool: call.name.clone(),
            message: e.to_string(),
        }),
    }
    .map_err(|e| {
        let mut d = e.to_details();
        d["type"] = json!(e.kind());
        d
    })
}

impl ToolCallsWithArgs {
    fn has_result_constraints(&self, patterns: &Patterns) -> bool {
        !self.result_includes.is_empty() || patterns.result.is_some() || self.no_error
    }

    fn result_violations(&self, trace: &[TurnToolCall], patterns: &Patterns) -> Vec<Value> {
        let mut out = Vec::new();
        for tc in trace
            .iter()
            .filter(|tc| self.tool_name.as_deref().map_or(true, |t| tc.name == t))
        {
            if self.no_error && !tc.error.is_empty() {
                out.push(json!({ "type": "tool_error", "tool": tc.name, "error": tc.error }));
            }
            for p in missing_substrings(&tc.result, &self.result_includes) {
                out.push(json!({ "type": "result_missing_pattern", "tool": tc.name, "pattern": p }));
            }
            if let Some(re) = &patterns.result {
                if !re.is_match(&tc.result) {
                    out.push(json!({
                        "type": "result_pattern_mismatch",
                        "tool": tc.name,
                        "pattern": re.as_str(),
                    }));
                }
            }
        }
        out
    }
}

impl Validator for ToolCallsWithArgs {
    fn name(&self) -> &'static str {
        "tool_calls_with_args"
    }

    fn validate(&self, _content: &str, params: &TurnParams) -> ValidationResult {
        let Some(calls) = turn_tool_calls(params) else {
            return ValidationResult::skip(SKIP_TURN_TRACE_UNAVAILABLE);
        };
        let patterns = match &self.patterns {
            Ok(p) => p,
            Err(e) => return ValidationResult::config_error(e),
        };

        let matching: Vec<&MessageToolCall> = calls
            .iter()
            .filter(|c| self.tool_name.as_deref().map_or(true, |t| c.name == t))
            .collect();

        if let Some(tool) = self.tool_name.as_deref().filter(|_| matching.is_empty()) {
            return Verdict::fail(
                format!("tool '{}' was not called", tool),
                json!({ "error": "tool_not_called", "tool_name": tool }),
            )
            .into_turn();
        }

        if self.expected_args.is_empty()
            && patterns.args.is_empty()
            && !self.has_result_constraints(patterns)
        {
            return Verdict::pass("no argument requirements configured", json!({})).into_turn();
        }

        let mut violations: Vec<Value> = Vec::new();
        for call in &matching {
            match parse_args(call) {
                Ok(args) => {
                    let exact = check_exact_args(&call.name, &args, &self.expected_args);
                    let pattern = check_pattern_args(&call.name, &args, &patterns.args);
                    violations.extend(
                        exact
                            .iter()
                            .chain(pattern.iter())
                            .map(|v| serde_json::to_value(v).unwrap_or(Value::Null)),
                    );
                }
                Err(v) => violations.push(v),
            }
        }

        let mut details = json!({ "matching_calls": matching.len() });
        if self.has_result_constraints(patterns) {
            match resolve_turn_trace(params) {
                Some(trace) => violations.extend(self.result_violations(&trace, patterns)),
                None => details["result_check_skipped"] = json!(true),
            }
        }

        let count = violations.len();
        details["violations"] = json!(violations);
        Verdict::check(
            count == 0,
            "tool calls satisfy argument requirements",
            format!("{} argument/result violation(s)", count),
            details,
        )
        .into_turn()
    }
}
