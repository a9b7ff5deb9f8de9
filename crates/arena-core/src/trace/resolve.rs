use crate::model::MessageToolResult;

/// A call record that can be paired with an incoming tool result.
///
/// Implemented by both the turn-scoped [`super::TurnToolCall`] and the
/// conversation-scoped `ToolCallRecord`, so the pairing loop exists once.
pub trait ResultTarget {
    fn call_id(&self) -> &str;
    fn tool_name(&self) -> &str;
    fn is_resolved(&self) -> bool;
    /// Stores the result. `text` is the already-extracted result content.
    fn apply_result(&mut self, result: &MessageToolResult, text: &str);
}

/// Resolves at most one entry with `result`; returns the index it landed on.
///
/// A non-empty result ID only ever matches by ID: if no unresolved entry
/// carries that ID the result is dropped, it does not fall back to the name.
/// Without an ID, the first unresolved entry with the same tool name wins, so
/// repeated un-IDed calls to one tool resolve in FIFO order.
pub fn apply_tool_result<T: ResultTarget>(
    entries: &mut [T],
    result: &MessageToolResult,
    text: &str,
) -> Option<usize> {
    let idx = if !result.id.is_empty() {
        entries
            .iter()
            .position(|e| !e.is_resolved() && e.call_id() == result.id)
    } else {
        entries
            .iter()
            .position(|e| !e.is_resolved() && e.tool_name() == result.name)
    }?;

    entries[idx].apply_result(result, text);
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Entry {
        id: String,
        name: String,
        result: Option<String>,
    }

    impl ResultTarget for Entry {
        fn call_id(&self) -> &str {
            &self.id
        }
        fn tool_name(&self) -> &str {
            &self.name
        }
        fn is_resolved(&self) -> bool {
            self.result.is_some()
        }
        fn apply_result(&mut self, _result: &MessageToolResult, text: &str) {
            self.result = Some(text.to_string());
        }
    }

    fn entry(id: &str, name: &str) -> Entry {
        Entry {
            id: id.into(),
            name: name.into(),
            result: None,
        }
    }

    #[test]
    fn test_id_match_wins_over_earlier_name_match() {
        let mut entries = vec![entry("", "search"), entry("c2", "search")];
        let idx = apply_tool_result(&mut entries, &MessageToolResult::new("c2", "search", ""), "x");
        assert_eq!(idx, Some(1));
        assert!(entries[0].result.is_none());
    }

    #[test]
    fn test_name_fallback_is_fifo() {
        let mut entries = vec![entry("", "search"), entry("", "search")];
        let r = MessageToolResult::new("", "search", "");
        assert_eq!(apply_tool_result(&mut entries, &r, "first"), Some(0));
        assert_eq!(apply_tool_result(&mut entries, &r, "second"), Some(1));
        assert_eq!(entries[0].result.as_deref(), Some("first"));
        assert_eq!(entries[1].result.as_deref(), Some("second"));
    }

    #[test]
    fn test_unknown_id_does_not_fall_back_to_name() {
        let mut entries = vec![entry("c1", "search")];
        let r = MessageToolResult::new("c9", "search", "");
        assert_eq!(apply_tool_result(&mut entries, &r, "x"), None);
        assert!(entries[0].result.is_none());
    }

    #[test]
    fn test_resolved_entries_are_skipped() {
        let mut entries = vec![entry("c1", "search")];
        let r = MessageToolResult::new("c1", "search", "");
        assert_eq!(apply_tool_result(&mut entries, &r, "a"), Some(0));
        assert_eq!(apply_tool_result(&mut entries, &r, "b"), None);
        assert_eq!(entries[0].result.as_deref(), Some("a"));
    }
}
