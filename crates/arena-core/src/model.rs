use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

/// Where a message came from. Runtime-only, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageSource {
    /// Caller-provided input (user turns, fixtures).
    #[default]
    Input,
    /// Produced by the pipeline during the current execution.
    Pipeline,
    /// Loaded from persisted conversation state; out of scope for turn checks.
    StateStore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<MessageToolResult>,
    #[serde(skip)]
    pub source: MessageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_info: Option<CostInfo>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            source: MessageSource::Pipeline,
            ..Default::default()
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::assistant(content)
        }
    }

    pub fn tool(result: MessageToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.content.clone(),
            tool_result: Some(result),
            source: MessageSource::Pipeline,
            ..Default::default()
        }
    }

    pub fn from_state_store(mut self) -> Self {
        self.source = MessageSource::StateStore;
        self
    }

    pub fn is_tool_call_batch(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_result.is_some()
    }

    /// Text of the tool result carried by this message, if any.
    pub fn tool_result_text(&self) -> Option<&str> {
        let tr = self.tool_result.as_ref()?;
        if tr.content.is_empty() {
            Some(self.content.as_str())
        } else {
            Some(tr.content.as_str())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Raw JSON text of the arguments. May be empty or unparsable.
    #[serde(default, deserialize_with = "raw_json_text")]
    pub args: String,
}

impl MessageToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }

    /// Parsed arguments, or `None` when the payload is not a JSON object.
    pub fn parsed_args(&self) -> Option<Map<String, Value>> {
        if self.args.trim().is_empty() {
            return None;
        }
        serde_json::from_str::<Map<String, Value>>(&self.args).ok()
    }
}

// Accepts either a string holding raw JSON or an inline JSON value.
fn raw_json_text<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageToolResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub latency_ms: u64,
}

impl MessageToolResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }
}

/// Token usage and cost for one LLM call. All costs in USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub input_cost_usd: f64,
    #[serde(default)]
    pub output_cost_usd: f64,
    #[serde(default)]
    pub cached_cost_usd: f64,
    #[serde(default)]
    pub total_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_accept_inline_object_or_raw_text() {
        let inline: MessageToolCall =
            serde_json::from_value(serde_json::json!({"id": "c1", "name": "get_order", "args": {"id": 42}}))
                .unwrap();
        assert_eq!(inline.parsed_args().unwrap()["id"], 42);

        let raw: MessageToolCall =
            serde_json::from_value(serde_json::json!({"name": "get_order", "args": "{\"id\":42}"}))
                .unwrap();
        assert_eq!(raw.parsed_args().unwrap()["id"], 42);

        let broken = MessageToolCall::new("c2", "get_order", "{not json");
        assert!(broken.parsed_args().is_none());
    }

    #[test]
    fn test_tool_result_text_falls_back_to_message_content() {
        let mut msg = Message::tool(MessageToolResult::new("c1", "search", ""));
        msg.content = "found 3 results".into();
        assert_eq!(msg.tool_result_text(), Some("found 3 results"));

        let msg = Message::tool(MessageToolResult::new("c1", "search", "direct"));
        assert_eq!(msg.tool_result_text(), Some("direct"));
    }

    #[test]
    fn test_tool_result_needs_tool_role() {
        let result = MessageToolResult::new("c1", "search", "ok");
        assert!(Message::tool(result.clone()).is_tool_result());

        let mut misplaced = Message::assistant("");
        misplaced.tool_result = Some(result);
        assert!(!misplaced.is_tool_result());
        assert!(!Message::user("hi").is_tool_result());
    }

    #[test]
    fn test_source_not_serialized() {
        let msg = Message::assistant("hi").from_state_store();
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v.get("source").is_none());
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back.source, MessageSource::Input);
    }
}
