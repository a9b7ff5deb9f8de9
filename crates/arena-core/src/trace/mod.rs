//! Turn trace reconstruction.
//!
//! Walks the messages of a single turn and rebuilds the ordered list of tool
//! calls the assistant made, each paired with its result and tagged with the
//! round it was issued in.

pub mod resolve;

use crate::model::{Message, MessageSource, MessageToolCall, MessageToolResult, Role};
use crate::params::TurnParams;
use resolve::{apply_tool_result, ResultTarget};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// One tool invocation within a turn, paired with its result once seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnToolCall {
    pub call_id: String,
    pub name: String,
    /// Parsed arguments; `None` when the payload was not a JSON object.
    pub args: Option<Map<String, Value>>,
    pub result: String,
    pub error: String,
    pub latency: Duration,
    pub round_index: usize,
    pub resolved: bool,
}

impl TurnToolCall {
    fn from_call(call: &MessageToolCall, round_index: usize) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            args: call.parsed_args(),
            round_index,
            ..Default::default()
        }
    }
}

impl ResultTarget for TurnToolCall {
    fn call_id(&self) -> &str {
        &self.call_id
    }

    fn tool_name(&self) -> &str {
        &self.name
    }

    fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn apply_result(&mut self, result: &MessageToolResult, text: &str) {
        self.result = text.to_string();
        self.error = result.error.clone();
        self.latency = Duration::from_millis(result.latency_ms);
        self.resolved = true;
    }
}

/// Rebuilds the tool-call trace of a turn.
///
/// Messages loaded from the state store belong to earlier turns and are
/// ignored. A new round starts when an assistant tool-call batch directly
/// follows a tool result; back-to-back batches share a round. Tool results
/// with no matching call are dropped.
pub fn build_turn_trace(messages: &[Message]) -> Vec<TurnToolCall> {
    let mut trace: Vec<TurnToolCall> = Vec::new();
    let mut round_index = 0usize;
    let mut prev_was_tool_result = false;

    for msg in messages
        .iter()
        .filter(|m| m.source != MessageSource::StateStore)
    {
        if msg.is_tool_call_batch() {
            if prev_was_tool_result && !trace.is_empty() {
                round_index += 1;
            }
            trace.extend(
                msg.tool_calls
                    .iter()
                    .map(|c| TurnToolCall::from_call(c, round_index)),
            );
            prev_was_tool_result = false;
        } else if let Some(result) = msg.tool_result.as_ref().filter(|_| msg.is_tool_result()) {
            let text = msg.tool_result_text().unwrap_or_default();
            if apply_tool_result(&mut trace, result, text).is_none() {
                tracing::debug!(
                    event = "arena.trace.result_dropped",
                    call_id = %result.id,
                    tool = %result.name,
                    "tool result has no matching call"
                );
            }
            prev_was_tool_result = true;
        } else {
            prev_was_tool_result = false;
        }
    }

    trace
}

/// Resolves the turn trace from runtime params.
///
/// Returns `None` when the host did not provide turn messages, meaning this
/// execution path exposes no tool-call data.
pub fn resolve_turn_trace(params: &TurnParams) -> Option<Vec<TurnToolCall>> {
    params.turn_messages.as_deref().map(build_turn_trace)
}

/// Tool-call requests made during the turn, without result pairing.
///
/// Falls back to the calls on `_assistant_message` when turn messages are
/// absent; `None` when neither is available.
pub fn turn_tool_calls(params: &TurnParams) -> Option<Vec<MessageToolCall>> {
    if let Some(messages) = &params.turn_messages {
        return Some(
            messages
                .iter()
                .filter(|m| m.source != MessageSource::StateStore && m.role == Role::Assistant)
                .flat_map(|m| m.tool_calls.iter().cloned())
                .collect(),
        );
    }
    params
        .assistant_message
        .as_ref()
        .map(|m| m.tool_calls.clone())
}
