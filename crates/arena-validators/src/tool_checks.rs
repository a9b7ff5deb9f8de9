//! Tool-call checks that run unchanged over a turn trace or a whole conversation.
//!
//! Each check is written once against [`ToolCallView`]s. [`OnTurn`] feeds it
//! the current turn's trace (skipping when the host exposes none) and
//! [`OnConversation`] feeds it every call recorded in the conversation.

use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::agent_assertions::matchers::{
    chain, collect_errors, count_with_bounds, result_includes, result_matches_regex, subsequence,
    StepViolation,
};
use arena_core::agent_assertions::view::{self, ToolCallView};
use arena_core::agent_assertions::{compile_steps, ChainStep, ChainStepConfig, ConversationContext};
use arena_core::errors::{compile_regex, ConfigError};
use arena_core::params::{opt_count, parse_config, string_list, TurnParams};
use arena_core::trace::resolve_turn_trace;
use arena_core::validator_api::{
    ConversationResult, ConversationValidator, ValidationResult, Validator,
    SKIP_TURN_TRACE_UNAVAILABLE,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

pub trait TraceCheck: Send + Sync + 'static {
    const NAME: &'static str;
    /// Only the tool-name presence checks may fall back to the calls on
    /// `_assistant_message` when the turn messages are missing. Everything
    /// else skips.
    const NEEDS_RESULTS: bool = true;

    /// Restricts a turn-level check to one round. Ignored at conversation level.
    fn round_index(&self) -> Option<usize> {
        None
    }

    fn check(&self, calls: &[ToolCallView]) -> Verdict;
}

/// Normalized views of the current turn's calls, or `None` if unavailable.
pub(crate) fn turn_views(
    params: &TurnParams,
    needs_results: bool,
    round: Option<usize>,
) -> Option<Vec<ToolCallView>> {
    let views = match resolve_turn_trace(params) {
        Some(trace) => view::from_turn_trace(&trace),
        None if !needs_results => params
            .assistant_message
            .as_ref()?
            .tool_calls
            .iter()
            .map(|c| ToolCallView {
                name: c.name.clone(),
                args: c.parsed_args(),
                result: String::new(),
                error: String::new(),
                index: 0,
            })
            .collect(),
        None => return None,
    };

    Some(match round {
        Some(r) => views.into_iter().filter(|v| v.index == r).collect(),
        None => views,
    })
}

pub struct OnTurn<C>(pub C);

impl<C: TraceCheck> Validator for OnTurn<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn validate(&self, _content: &str, params: &TurnParams) -> ValidationResult {
        match turn_views(params, C::NEEDS_RESULTS, self.0.round_index()) {
            Some(calls) => self.0.check(&calls).into_turn(),
            None => {
                tracing::debug!(
                    event = "arena.validator.skipped",
                    validator = C::NAME,
                    reason = SKIP_TURN_TRACE_UNAVAILABLE,
                    "check skipped"
                );
                ValidationResult::skip(SKIP_TURN_TRACE_UNAVAILABLE)
            }
        }
    }
}

pub struct OnConversation<C>(pub C);

#[async_trait]
impl<C: TraceCheck> ConversationValidator for OnConversation<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let calls = view::from_conversation(&ctx.tool_calls);
        Ok(self.0.check(&calls).into_conversation())
    }
}

fn call_names(calls: &[ToolCallView]) -> Vec<&str> {
    calls.iter().map(|c| c.name.as_str()).collect()
}

// tools_called / tools_not_called

#[derive(Debug, Deserialize)]
struct ToolsConfig {
    #[serde(default, deserialize_with = "string_list")]
    tools: Vec<String>,
}

pub struct ToolsCalled {
    tools: Vec<String>,
}

impl FromParams for ToolsCalled {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ToolsConfig = parse_config(Self::NAME, params)?;
        Ok(Self { tools: cfg.tools })
    }
}

impl TraceCheck for ToolsCalled {
    const NAME: &'static str = "tools_called";
    const NEEDS_RESULTS: bool = false;

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let called: HashSet<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        let missing: Vec<&String> = self
            .tools
            .iter()
            .filter(|t| !called.contains(t.as_str()))
            .collect();
        Verdict::check(
            missing.is_empty(),
            "all expected tools were called",
            format!("missing tool calls: {:?}", missing),
            json!({ "missing_tools": missing, "called_tools": call_names(calls) }),
        )
    }
}

pub struct ToolsNotCalled {
    tools: Vec<String>,
}

impl FromParams for ToolsNotCalled {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ToolsConfig = parse_config(Self::NAME, params)?;
        Ok(Self { tools: cfg.tools })
    }
}

impl TraceCheck for ToolsNotCalled {
    const NAME: &'static str = "tools_not_called";
    const NEEDS_RESULTS: bool = false;

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let forbidden: HashSet<&str> = self.tools.iter().map(String::as_str).collect();
        let mut hits: Vec<&str> = Vec::new();
        for c in calls {
            if forbidden.contains(c.name.as_str()) && !hits.contains(&c.name.as_str()) {
                hits.push(&c.name);
            }
        }
        Verdict::check(
            hits.is_empty(),
            "no forbidden tools were called",
            format!("forbidden tools called: {:?}", hits),
            json!({ "forbidden_tools_called": hits }),
        )
    }
}

// tool_call_count

#[derive(Debug, Deserialize)]
struct CountConfig {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default, deserialize_with = "opt_count")]
    min: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    max: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    round_index: Option<usize>,
}

pub struct ToolCallCount {
    tool: Option<String>,
    min: Option<usize>,
    max: Option<usize>,
    round_index: Option<usize>,
}

impl FromParams for ToolCallCount {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: CountConfig = parse_config(Self::NAME, params)?;
        Ok(Self {
            tool: cfg.tool.filter(|t| !t.is_empty()),
            min: cfg.min,
            max: cfg.max,
            round_index: cfg.round_index,
        })
    }
}

impl TraceCheck for ToolCallCount {
    const NAME: &'static str = "tool_call_count";

    fn round_index(&self) -> Option<usize> {
        self.round_index
    }

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let out = count_with_bounds(calls, self.tool.as_deref(), self.min, self.max);
        let details = json!({
            "count": out.count,
            "tool": self.tool,
            "min": self.min,
            "max": self.max,
        });
        match out.violation {
            Some(msg) => Verdict::fail(msg, details),
            None => Verdict::pass(format!("{} calls within bounds", out.count), details),
        }
    }
}

// no_tool_errors

#[derive(Debug, Deserialize)]
struct NoErrorsConfig {
    #[serde(default, deserialize_with = "string_list")]
    tools: Vec<String>,
    #[serde(default, deserialize_with = "opt_count")]
    round_index: Option<usize>,
}

pub struct NoToolErrors {
    tools: Vec<String>,
    round_index: Option<usize>,
}

impl FromParams for NoToolErrors {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: NoErrorsConfig = parse_config(Self::NAME, params)?;
        Ok(Self {
            tools: cfg.tools,
            round_index: cfg.round_index,
        })
    }
}

impl TraceCheck for NoToolErrors {
    const NAME: &'static str = "no_tool_errors";

    fn round_index(&self) -> Option<usize> {
        self.round_index
    }

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let errors: Vec<Value> = collect_errors(calls, &self.tools)
            .into_iter()
            .map(|c| json!({ "tool": c.name, "index": c.index, "error": c.error }))
            .collect();
        Verdict::check(
            errors.is_empty(),
            "no tool errors",
            format!("{} tool call(s) returned errors", errors.len()),
            json!({ "errors": errors }),
        )
    }
}

// tool_result_includes

#[derive(Debug, Deserialize)]
struct ResultIncludesConfig {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    patterns: Vec<String>,
    #[serde(default, deserialize_with = "opt_count")]
    occurrence: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    round_index: Option<usize>,
}

pub struct ToolResultIncludes {
    tool: Option<String>,
    patterns: Vec<String>,
    occurrence: usize,
    round_index: Option<usize>,
}

impl FromParams for ToolResultIncludes {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ResultIncludesConfig = parse_config(Self::NAME, params)?;
        Ok(Self {
            tool: cfg.tool.filter(|t| !t.is_empty()),
            patterns: cfg.patterns,
            occurrence: cfg.occurrence.unwrap_or(1),
            round_index: cfg.round_index,
        })
    }
}

impl TraceCheck for ToolResultIncludes {
    const NAME: &'static str = "tool_result_includes";

    fn round_index(&self) -> Option<usize> {
        self.round_index
    }

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        if self.patterns.is_empty() {
            return Verdict::pass("no patterns configured", json!({}));
        }
        let out = result_includes(calls, self.tool.as_deref(), &self.patterns);
        let passed = out.match_count >= self.occurrence;
        let mut details = json!({
            "match_count": out.match_count,
            "occurrence": self.occurrence,
            "checked": out.checked,
        });
        if !passed {
            let missing: Vec<&String> = out
                .misses
                .iter()
                .flat_map(|m| m.missing_patterns.iter())
                .fold(Vec::new(), |mut acc, p| {
                    if !acc.contains(&p) {
                        acc.push(p);
                    }
                    acc
                });
            details["missing_patterns"] = json!(missing);
            details["misses"] = json!(out.misses);
        }
        Verdict::check(
            passed,
            format!("{} result(s) contain all patterns", out.match_count),
            format!(
                "expected at least {} result(s) containing {:?}, found {}",
                self.occurrence, self.patterns, out.match_count
            ),
            details,
        )
    }
}

// tool_result_matches

#[derive(Debug, Deserialize)]
struct ResultMatchesConfig {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    pattern: String,
    #[serde(default, deserialize_with = "opt_count")]
    occurrence: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    round_index: Option<usize>,
}

pub struct ToolResultMatches {
    tool: Option<String>,
    pattern: Result<Regex, ConfigError>,
    occurrence: usize,
    round_index: Option<usize>,
}

impl FromParams for ToolResultMatches {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ResultMatchesConfig = parse_config(Self::NAME, params)?;
        let pattern = if cfg.pattern.is_empty() {
            Err(ConfigError::MissingParam("pattern".into()))
        } else {
            compile_regex(&cfg.pattern)
        };
        Ok(Self {
            tool: cfg.tool.filter(|t| !t.is_empty()),
            pattern,
            occurrence: cfg.occurrence.unwrap_or(1),
            round_index: cfg.round_index,
        })
    }
}

impl TraceCheck for ToolResultMatches {
    const NAME: &'static str = "tool_result_matches";

    fn round_index(&self) -> Option<usize> {
        self.round_index
    }

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let re = match &self.pattern {
            Ok(re) => re,
            Err(e) => return Verdict::config_error(e),
        };
        let out = result_matches_regex(calls, self.tool.as_deref(), re);
        Verdict::check(
            out.match_count >= self.occurrence,
            format!("{} result(s) match pattern", out.match_count),
            format!(
                "expected at least {} result(s) matching '{}', found {}",
                self.occurrence,
                re.as_str(),
                out.match_count
            ),
            json!({
                "match_count": out.match_count,
                "occurrence": self.occurrence,
                "checked": out.checked,
                "pattern": re.as_str(),
            }),
        )
    }
}

// tool_call_sequence

#[derive(Debug, Deserialize)]
struct SequenceConfig {
    #[serde(default, deserialize_with = "string_list")]
    sequence: Vec<String>,
}

pub struct ToolCallSequence {
    sequence: Vec<String>,
}

impl FromParams for ToolCallSequence {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: SequenceConfig = parse_config(Self::NAME, params)?;
        Ok(Self {
            sequence: cfg.sequence,
        })
    }
}

impl TraceCheck for ToolCallSequence {
    const NAME: &'static str = "tool_call_sequence";

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let out = subsequence(calls, &self.sequence);
        let total = self.sequence.len();
        let mut details = json!({
            "matched": out.matched,
            "expected": self.sequence,
            "actual": out.actual,
        });
        if out.matched < total {
            details["next_expected"] = json!(self.sequence[out.matched]);
        }
        Verdict::check(
            out.matched == total,
            "tool calls follow the expected sequence",
            format!("sequence incomplete: matched {}/{} steps", out.matched, total),
            details,
        )
    }
}

// tool_call_chain

#[derive(Debug, Deserialize)]
struct ChainConfig {
    #[serde(default)]
    steps: Vec<ChainStepConfig>,
}

pub struct ToolCallChain {
    steps: Result<Vec<ChainStep>, ConfigError>,
}

impl FromParams for ToolCallChain {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: ChainConfig = parse_config(Self::NAME, params)?;
        Ok(Self {
            steps: compile_steps(&cfg.steps),
        })
    }
}

fn describe(v: &StepViolation) -> String {
    match v {
        StepViolation::NoError { error } => format!("tool returned error: {}", error),
        StepViolation::ResultIncludes { missing_patterns } => {
            format!("result missing patterns {:?}", missing_patterns)
        }
        StepViolation::ResultMatches { pattern } => {
            format!("result does not match '{}'", pattern)
        }
        StepViolation::ArgsMatch { argument, pattern, .. } => {
            format!("argument '{}' does not match '{}'", argument, pattern)
        }
    }
}

impl TraceCheck for ToolCallChain {
    const NAME: &'static str = "tool_call_chain";

    fn check(&self, calls: &[ToolCallView]) -> Verdict {
        let steps = match &self.steps {
            Ok(steps) => steps,
            Err(e) => return Verdict::config_error(e),
        };
        let out = chain(calls, steps);
        let mut details = json!({
            "completed_steps": out.completed_steps,
            "total_steps": out.total_steps,
        });

        if let Some(failure) = &out.failure {
            details["failure"] = json!(failure);
            return Verdict::fail(
                format!(
                    "chain failed at step {} ({}): {}",
                    failure.step,
                    failure.tool,
                    describe(&failure.violation)
                ),
                details,
            );
        }

        if out.completed_steps < out.total_steps {
            details["next_step"] = json!(steps[out.completed_steps].tool);
            return Verdict::fail(
                format!(
                    "chain incomplete: {}/{} steps completed",
                    out.completed_steps, out.total_steps
                ),
                details,
            );
        }

        Verdict::pass("all chain steps satisfied", details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::model::{Message, MessageToolCall, MessageToolResult};

    fn v(name: &str, result: &str, error: &str, index: usize) -> ToolCallView {
        ToolCallView {
            name: name.into(),
            args: None,
            result: result.into(),
            error: error.into(),
            index,
        }
    }

    #[test]
    fn test_tools_called_reports_missing() {
        let check = ToolsCalled::from_params(&json!({"tools": ["get_order", "refund"]})).unwrap();
        let out = check.check(&[v("get_order", "", "", 0)]);
        assert!(!out.passed);
        assert_eq!(out.details["missing_tools"], json!(["refund"]));
    }

    #[test]
    fn test_tools_not_called_dedupes_hits() {
        let check = ToolsNotCalled::from_params(&json!({"tools": "delete"})).unwrap();
        let out = check.check(&[v("delete", "", "", 0), v("delete", "", "", 1)]);
        assert!(!out.passed);
        assert_eq!(out.details["forbidden_tools_called"], json!(["delete"]));
    }

    #[test]
    fn test_count_accepts_float_bounds() {
        let check = ToolCallCount::from_params(&json!({"tool": "search", "min": 2.0, "max": 2})).unwrap();
        let calls = [v("search", "", "", 0), v("search", "", "", 1)];
        assert!(check.check(&calls).passed);
    }

    #[test]
    fn test_result_includes_without_patterns_passes() {
        let check = ToolResultIncludes::from_params(&json!({"tool": "search"})).unwrap();
        assert!(check.check(&[]).passed);
    }

    #[test]
    fn test_result_includes_occurrence_threshold() {
        let calls = [
            v("search", "Found order, shipped", "", 0),
            v("search", "Found order, pending", "", 1),
        ];
        let two = ToolResultIncludes::from_params(
            &json!({"tool": "search", "patterns": ["found"], "occurrence": 2}),
        )
        .unwrap();
        assert!(two.check(&calls).passed);

        let shipped = ToolResultIncludes::from_params(
            &json!({"tool": "search", "patterns": ["shipped"], "occurrence": 2}),
        )
        .unwrap();
        let out = shipped.check(&calls);
        assert!(!out.passed);
        assert_eq!(out.details["missing_patterns"], json!(["shipped"]));
    }

    #[test]
    fn test_result_matches_bad_regex_is_config_error() {
        let check = ToolResultMatches::from_params(&json!({"pattern": "[invalid"})).unwrap();
        let out = check.check(&[v("x", "y", "", 0)]);
        assert!(!out.passed);
        assert_eq!(out.details["error"], "invalid_regex");

        let missing = ToolResultMatches::from_params(&json!({})).unwrap();
        assert_eq!(missing.check(&[]).details["error"], "missing_param");
    }

    #[test]
    fn test_sequence_reports_next_expected() {
        let check = ToolCallSequence::from_params(&json!({"sequence": ["search", "delete"]})).unwrap();
        let out = check.check(&[v("search", "", "", 0), v("write", "", "", 0)]);
        assert!(!out.passed);
        assert_eq!(out.details["matched"], 1);
        assert_eq!(out.details["next_expected"], "delete");
    }

    #[test]
    fn test_chain_failure_details_are_structured() {
        let check = ToolCallChain::from_params(&json!({
            "steps": [{"tool": "get_order", "result_includes": ["not_present"]}, {"tool": "refund"}]
        }))
        .unwrap();
        let out = check.check(&[v("get_order", r#"{"order_id":"ORD-1"}"#, "", 0)]);
        assert!(!out.passed);
        let f = &out.details["failure"];
        assert_eq!(f["step"], 0);
        assert_eq!(f["tool"], "get_order");
        assert_eq!(f["constraint"], "result_includes");
        assert_eq!(f["missing_patterns"], json!(["not_present"]));
    }

    #[test]
    fn test_chain_over_structured_result() {
        let check = ToolCallChain::from_params(&json!({
            "steps": [{"tool": "api_call", "result_matches": "status"}]
        }))
        .unwrap();
        let calls = view::from_conversation(&[arena_core::agent_assertions::ToolCallRecord {
            tool_name: "api_call".into(),
            result: Some(json!({"status": "ok"})),
            ..Default::default()
        }]);
        assert!(check.check(&calls).passed);
    }

    #[test]
    fn test_round_index_filters_turn_views() {
        let msgs = vec![
            Message::assistant_with_calls("", vec![MessageToolCall::new("1", "a", "{}")]),
            Message::tool(MessageToolResult::new("1", "a", "")),
            Message::assistant_with_calls("", vec![MessageToolCall::new("2", "b", "{}")]),
        ];
        let params = TurnParams::with_turn_messages(msgs);
        let round1 = turn_views(&params, true, Some(1)).unwrap();
        assert_eq!(round1.len(), 1);
        assert_eq!(round1[0].name, "b");
    }

    #[test]
    fn test_presence_checks_fall_back_to_assistant_message() {
        let params = TurnParams {
            assistant_message: Some(Message::assistant_with_calls(
                "",
                vec![MessageToolCall::new("1", "search", "{}")],
            )),
            ..Default::default()
        };
        assert_eq!(turn_views(&params, false, None).unwrap().len(), 1);
        assert!(turn_views(&params, true, None).is_none());
    }

    #[test]
    fn test_skips_without_turn_messages_regardless_of_config() {
        let check = OnTurn(ToolCallCount::from_params(&json!({"min": 999})).unwrap());
        let r = check.validate("", &TurnParams::default());
        assert!(r.passed && r.skipped);
        assert_eq!(r.skip_reason(), Some(SKIP_TURN_TRACE_UNAVAILABLE));

        // Calls on the assistant message alone are not a trace.
        let duplex = TurnParams {
            assistant_message: Some(Message::assistant_with_calls(
                "",
                vec![MessageToolCall::new("1", "search", "{}")],
            )),
            ..Default::default()
        };
        let r = check.validate("", &duplex);
        assert!(r.passed && r.skipped, "{:?}", r);

        let seq = OnTurn(
            ToolCallSequence::from_params(&json!({"sequence": ["search", "write"]})).unwrap(),
        );
        let r = seq.validate("", &duplex);
        assert!(r.passed && r.skipped, "{:?}", r);

        let called = OnTurn(ToolsCalled::from_params(&json!({"tools": ["search"]})).unwrap());
        let r = called.validate("", &duplex);
        assert!(r.passed && !r.skipped, "{:?}", r);

        let bad = OnTurn(ToolResultMatches::from_params(&json!({"pattern": "[x"})).unwrap());
        assert!(bad.validate("", &TurnParams::default()).skipped);
    }

    #[tokio::test]
    async fn test_conversation_wrapper_uses_all_calls() {
        let ctx = arena_core::agent_assertions::build_conversation_context(
            vec![
                Message::assistant_with_calls("", vec![MessageToolCall::new("c1", "search", "{}")]),
                Message::tool(MessageToolResult::new("c1", "search", "").with_error("timeout")),
            ],
            Default::default(),
        );
        let check = OnConversation(NoToolErrors::from_params(&Value::Null).unwrap());
        let r = check.validate_conversation(&ctx).await.unwrap();
        assert!(!r.passed);
        assert_eq!(r.details["errors"][0]["error"], "timeout");
    }
}
