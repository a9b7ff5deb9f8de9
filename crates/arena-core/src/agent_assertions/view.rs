use super::conversation::ToolCallRecord;
use crate::trace::TurnToolCall;
use serde::Serialize;
use serde_json::{Map, Value};

/// Matcher-facing projection of a tool call, independent of where it came from.
///
/// `index` is the round index for turn traces and the turn index for
/// conversation records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallView {
    pub name: String,
    pub args: Option<Map<String, Value>>,
    pub result: String,
    pub error: String,
    pub index: usize,
}

pub fn from_turn_trace(trace: &[TurnToolCall]) -> Vec<ToolCallView> {
    trace
        .iter()
        .map(|tc| ToolCallView {
            name: tc.name.clone(),
            args: tc.args.clone(),
            result: tc.result.clone(),
            error: tc.error.clone(),
            index: tc.round_index,
        })
        .collect()
}

pub fn from_conversation(records: &[ToolCallRecord]) -> Vec<ToolCallView> {
    records
        .iter()
        .map(|r| ToolCallView {
            name: r.tool_name.clone(),
            args: r.arguments.clone(),
            result: stringify_result(r.result.as_ref()),
            error: r.error.clone(),
            index: r.turn_index,
        })
        .collect()
}

/// Absent results become "", strings pass through, anything else is compact JSON.
pub fn stringify_result(result: Option<&Value>) -> String {
    match result {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
