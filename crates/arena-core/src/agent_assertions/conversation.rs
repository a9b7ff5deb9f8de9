use crate::model::{CostInfo, Message, MessageToolResult, Role};
use crate::trace::resolve::{apply_tool_result, ResultTarget};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// One tool invocation anywhere in a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCallRecord {
    /// Index of the assistant message that issued the call.
    pub turn_index: usize,
    pub tool_name: String,
    pub call_id: String,
    pub arguments: Option<Map<String, Value>>,
    pub result: Option<Value>,
    pub error: String,
    pub duration: Duration,
    #[serde(skip)]
    pub resolved: bool,
}

impl ResultTarget for ToolCallRecord {
    fn call_id(&self) -> &str {
        &self.call_id
    }

    fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn apply_result(&mut self, result: &MessageToolResult, text: &str) {
        self.result = Some(Value::String(text.to_string()));
        self.error = result.error.clone();
        self.duration = Duration::from_millis(result.latency_ms);
        self.resolved = true;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cached_cost_usd: f64,
    pub total_cost_usd: f64,
}

impl CostSummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    fn add(&mut self, c: &CostInfo) {
        self.input_tokens += c.input_tokens;
        self.output_tokens += c.output_tokens;
        self.cached_tokens += c.cached_tokens;
        self.input_cost_usd += c.input_cost_usd;
        self.output_cost_usd += c.output_cost_usd;
        self.cached_cost_usd += c.cached_cost_usd;
        self.total_cost_usd += c.total_cost_usd;
    }
}

/// Everything a conversation-level assertion can look at.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Content of the last assistant message.
    pub current_output: String,
    pub cost: CostSummary,
    pub metadata: Map<String, Value>,
}

impl ConversationContext {
    pub fn workflow_state(&self) -> Option<&str> {
        self.metadata.get(WORKFLOW_STATE).and_then(Value::as_str)
    }

    /// Target states recorded in the transition log, in order.
    ///
    /// Entries may be plain state names or objects carrying a `to` field.
    pub fn workflow_transitions(&self) -> Vec<String> {
        let Some(Value::Array(entries)) = self.metadata.get(WORKFLOW_TRANSITIONS) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|e| match e {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("to").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    pub fn workflow_complete(&self) -> bool {
        self.metadata
            .get(WORKFLOW_COMPLETE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

pub const WORKFLOW_STATE: &str = "workflow_state";
pub const WORKFLOW_TRANSITIONS: &str = "workflow_transitions";
pub const WORKFLOW_COMPLETE: &str = "workflow_complete";

const WORKFLOW_META_KEYS: [(&str, &str); 3] = [
    ("_workflow_state", WORKFLOW_STATE),
    ("_workflow_transitions", WORKFLOW_TRANSITIONS),
    ("_workflow_complete", WORKFLOW_COMPLETE),
];

/// Aggregates a conversation's history into a [`ConversationContext`].
///
/// Caller metadata is the base; workflow keys found on messages override it.
pub fn build_conversation_context(
    messages: Vec<Message>,
    metadata: Map<String, Value>,
) -> ConversationContext {
    let tool_calls = extract_tool_calls(&messages);
    let cost = aggregate_cost(&messages);

    let mut metadata = metadata;
    extract_workflow_metadata(&messages, &mut metadata);

    let current_output = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    ConversationContext {
        messages,
        tool_calls,
        current_output,
        cost,
        metadata,
    }
}

/// Every tool call in the conversation, paired with its result.
///
/// Results are matched against the whole accumulated list, not just the
/// current round.
pub fn extract_tool_calls(messages: &[Message]) -> Vec<ToolCallRecord> {
    let mut records: Vec<ToolCallRecord> = Vec::new();

    for (idx, msg) in messages.iter().enumerate() {
        if msg.role == Role::Assistant {
            records.extend(msg.tool_calls.iter().map(|c| ToolCallRecord {
                turn_index: idx,
                tool_name: c.name.clone(),
                call_id: c.id.clone(),
                arguments: c.parsed_args(),
                ..Default::default()
            }));
        }

        if let Some(result) = msg.tool_result.as_ref().filter(|_| msg.role == Role::Tool) {
            let text = msg.tool_result_text().unwrap_or_default();
            if apply_tool_result(&mut records, result, text).is_none() {
                tracing::debug!(
                    event = "arena.conversation.result_dropped",
                    message_index = idx,
                    call_id = %result.id,
                    tool = %result.name,
                    "tool result has no matching call"
                );
            }
        }
    }

    records
}

/// Copies workflow annotations from message meta into `out`. Last write wins.
pub fn extract_workflow_metadata(messages: &[Message], out: &mut Map<String, Value>) {
    for msg in messages {
        for (src, dst) in WORKFLOW_META_KEYS {
            if let Some(v) = msg.meta.get(src) {
                out.insert(dst.to_string(), v.clone());
            }
        }
    }
}

/// Sums cost info over the messages that carry it.
pub fn aggregate_cost(messages: &[Message]) -> CostSummary {
    let mut summary = CostSummary::default();
    for cost in messages.iter().filter_map(|m| m.cost_info.as_ref()) {
        summary.add(cost);
    }
    summary
}
