use super::model::ChainStep;
use super::view::ToolCallView;
use crate::errors::{compile_regex, ConfigError};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

fn name_matches(call: &ToolCallView, tool: Option<&str>) -> bool {
    tool.map_or(true, |t| call.name == t)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountOutcome {
    pub count: usize,
    pub violation: Option<String>,
}

/// Counts calls (optionally of one tool) and checks them against the bounds.
///
/// `None` means the bound is not set; `Some(0)` is a real bound.
pub fn count_with_bounds(
    calls: &[ToolCallView],
    tool: Option<&str>,
    min: Option<usize>,
    max: Option<usize>,
) -> CountOutcome {
    let count = calls.iter().filter(|c| name_matches(c, tool)).count();
    let target = tool.map_or_else(|| "any tool".to_string(), |t| format!("tool '{}'", t));

    let violation = match (min, max) {
        (Some(min), _) if count < min => Some(format!(
            "expected at least {} calls to {}, got {}",
            min, target, count
        )),
        (_, Some(max)) if count > max => Some(format!(
            "expected at most {} calls to {}, got {}",
            max, target, count
        )),
        _ => None,
    };

    CountOutcome { count, violation }
}

/// Calls that reported an error, restricted to `scope` when it is non-empty.
pub fn collect_errors<'a>(calls: &'a [ToolCallView], scope: &[String]) -> Vec<&'a ToolCallView> {
    let scope: HashSet<&str> = scope.iter().map(String::as_str).collect();
    calls
        .iter()
        .filter(|c| scope.is_empty() || scope.contains(c.name.as_str()))
        .filter(|c| !c.error.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludesMiss {
    pub tool: String,
    pub index: usize,
    pub missing_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncludesOutcome {
    pub match_count: usize,
    pub checked: usize,
    pub misses: Vec<IncludesMiss>,
}

/// Patterns from `patterns` that do not occur in `text`, compared case-insensitively.
pub fn missing_substrings(text: &str, patterns: &[String]) -> Vec<String> {
    let lower = text.to_lowercase();
    patterns
        .iter()
        .filter(|p| !lower.contains(&p.to_lowercase()))
        .cloned()
        .collect()
}

/// Counts calls whose result contains every pattern (case-insensitive).
pub fn result_includes(
    calls: &[ToolCallView],
    tool: Option<&str>,
    patterns: &[String],
) -> IncludesOutcome {
    let mut out = IncludesOutcome::default();
    for call in calls.iter().filter(|c| name_matches(c, tool)) {
        out.checked += 1;
        let missing = missing_substrings(&call.result, patterns);
        if missing.is_empty() {
            out.match_count += 1;
        } else {
            out.misses.push(IncludesMiss {
                tool: call.name.clone(),
                index: call.index,
                missing_patterns: missing,
            });
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchesOutcome {
    pub match_count: usize,
    pub checked: usize,
}

/// Counts calls whose result matches `pattern` (case-sensitive regex).
///
/// An invalid pattern is a configuration error, never a non-match.
pub fn result_matches(
    calls: &[ToolCallView],
    tool: Option<&str>,
    pattern: &str,
) -> Result<MatchesOutcome, ConfigError> {
    let re = compile_regex(pattern)?;
    Ok(result_matches_regex(calls, tool, &re))
}

pub fn result_matches_regex(calls: &[ToolCallView], tool: Option<&str>, re: &Regex) -> MatchesOutcome {
    let mut out = MatchesOutcome::default();
    for call in calls.iter().filter(|c| name_matches(c, tool)) {
        out.checked += 1;
        if re.is_match(&call.result) {
            out.match_count += 1;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceOutcome {
    pub matched: usize,
    pub actual: Vec<String>,
}

/// Single-pass subsequence scan: non-matching calls are skipped, not failures.
pub fn subsequence(calls: &[ToolCallView], expected: &[String]) -> SequenceOutcome {
    let mut matched = 0usize;
    for call in calls {
        if matched < expected.len() && call.name == expected[matched] {
            matched += 1;
        }
    }
    SequenceOutcome {
        matched,
        actual: calls.iter().map(|c| c.name.clone()).collect(),
    }
}

/// The constraint a chain step failed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum StepViolation {
    NoError { error: String },
    ResultIncludes { missing_patterns: Vec<String> },
    ResultMatches { pattern: String },
    ArgsMatch { argument: String, pattern: String, actual: Option<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainFailure {
    pub step: usize,
    pub tool: String,
    pub call_index: usize,
    #[serde(flatten)]
    pub violation: StepViolation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainOutcome {
    pub completed_steps: usize,
    pub total_steps: usize,
    pub failure: Option<ChainFailure>,
}

impl ChainOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.completed_steps == self.total_steps
    }
}

/// Ordered dependency-chain check with per-step constraints.
///
/// The first call whose name matches the current step is the one validated;
/// a constraint violation on it aborts the whole check rather than waiting for
/// a later call of the same tool.
pub fn chain(calls: &[ToolCallView], steps: &[ChainStep]) -> ChainOutcome {
    let mut completed = 0usize;

    for call in calls {
        let Some(step) = steps.get(completed) else {
            break;
        };
        if call.name != step.tool {
            continue;
        }
        if let Some(violation) = check_step(step, call) {
            return ChainOutcome {
                completed_steps: completed,
                total_steps: steps.len(),
                failure: Some(ChainFailure {
                    step: completed,
                    tool: step.tool.clone(),
                    call_index: call.index,
                    violation,
                }),
            };
        }
        completed += 1;
    }

    ChainOutcome {
        completed_steps: completed,
        total_steps: steps.len(),
        failure: None,
    }
}

fn check_step(step: &ChainStep, call: &ToolCallView) -> Option<StepViolation> {
    if step.no_error && !call.error.is_empty() {
        return Some(StepViolation::NoError {
            error: call.error.clone(),
        });
    }

    let missing = missing_substrings(&call.result, &step.result_includes);
    if !missing.is_empty() {
        return Some(StepViolation::ResultIncludes {
            missing_patterns: missing,
        });
    }

    if let Some(re) = &step.result_matches {
        if !re.is_match(&call.result) {
            return Some(StepViolation::ResultMatches {
                pattern: re.as_str().to_string(),
            });
        }
    }

    for (arg, re) in &step.args_match {
        let actual = call.args.as_ref().and_then(|a| a.get(arg));
        let ok = actual.is_some_and(|v| re.is_match(&value_as_string(v)));
        if !ok {
            return Some(StepViolation::ArgsMatch {
                argument: arg.clone(),
                pattern: re.as_str().to_string(),
                actual: actual.cloned(),
            });
        }
    }

    None
}

/// Renders an argument value for comparison: strings bare, everything else as JSON.
pub fn value_as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A mismatch between a call's arguments and the expected ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgViolation {
    MissingArgument {
        tool: String,
        argument: String,
    },
    ValueMismatch {
        tool: String,
        argument: String,
        expected: Value,
        actual: Value,
    },
    MissingArgumentForPattern {
        tool: String,
        argument: String,
        pattern: String,
    },
    PatternMismatch {
        tool: String,
        argument: String,
        pattern: String,
        actual: Value,
    },
}

/// Checks exact argument values. A `null` expected value only requires presence.
pub fn check_exact_args(
    tool: &str,
    args: &Map<String, Value>,
    expected: &BTreeMap<String, Value>,
) -> Vec<ArgViolation> {
    let mut out = Vec::new();
    for (name, want) in expected {
        match args.get(name) {
            None => out.push(ArgViolation::MissingArgument {
                tool: tool.to_string(),
                argument: name.clone(),
            }),
            Some(got) if !want.is_null() && value_as_string(got) != value_as_string(want) => {
                out.push(ArgViolation::ValueMismatch {
                    tool: tool.to_string(),
                    argument: name.clone(),
                    expected: want.clone(),
                    actual: got.clone(),
                })
            }
            Some(_) => {}
        }
    }
    out
}

/// Checks argument values against precompiled regex patterns.
pub fn check_pattern_args(
    tool: &str,
    args: &Map<String, Value>,
    patterns: &[(String, Regex)],
) -> Vec<ArgViolation> {
    let mut out = Vec::new();
    for (name, re) in patterns {
        match args.get(name) {
            None => out.push(ArgViolation::MissingArgumentForPattern {
                tool: tool.to_string(),
                argument: name.clone(),
                pattern: re.as_str().to_string(),
            }),
            Some(v) if !re.is_match(&value_as_string(v)) => out.push(ArgViolation::PatternMismatch {
                tool: tool.to_string(),
                argument: name.clone(),
                pattern: re.as_str().to_string(),
                actual: v.clone(),
            }),
            Some(_) => {}
        }
    }
    out
}
