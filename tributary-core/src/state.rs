//! Stream accumulator.
//!
//! [`StreamState`] is the mutable, single-owner state of one logical
//! request. Turn-scoped fields are cleared by [`StreamState::reset`] between
//! vendor turns; request-scoped fields (the stream-started flag, cumulative
//! usage, citations, additional content) survive until the request ends.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::event::{Citation, FinishReason};
use crate::message::ToolCall;
use crate::usage::Usage;

/// A tool call whose arguments are still arriving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialToolCall {
    /// Vendor call id, if announced yet.
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Concatenated raw argument fragments.
    pub arguments: String,
}

/// A vendor-executed tool block that is still open.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderToolBlock {
    /// Vendor tool type.
    pub tool_type: String,
    /// Vendor item id.
    pub item_id: String,
    /// Input known when the block opened.
    pub input: Value,
    /// Streamed input fragments.
    pub streamed_input: String,
}

/// Mutable state of one logical request.
#[derive(Debug, Clone)]
pub struct StreamState {
    /// Id of the current assistant message.
    pub message_id: String,
    /// Id of the current reasoning block.
    pub reasoning_id: String,
    /// Whether `StreamStart` was emitted.
    pub stream_started: bool,
    /// Whether `StepStart` was emitted for the current turn.
    pub step_started: bool,
    /// Whether the text channel is open.
    pub text_started: bool,
    /// Whether the thinking channel is open.
    pub thinking_started: bool,
    /// Whether the current reasoning id has already been used by a block.
    pub reasoning_used: bool,
    /// All text of the current turn.
    pub current_text: String,
    /// All reasoning of the current turn.
    pub current_thinking: String,
    /// Signature of the current turn's reasoning.
    pub thinking_signature: Option<String>,
    /// Tool calls still collecting fragments, keyed by index.
    pub tool_call_fragments: BTreeMap<usize, PartialToolCall>,
    /// Tool calls finalized in this turn, in finalization order.
    pub finished_tool_calls: Vec<ToolCall>,
    /// Open vendor-executed tool blocks, keyed by index.
    pub provider_tools: BTreeMap<usize, ProviderToolBlock>,
    /// Usage summed over completed turns.
    pub usage: Usage,
    /// Usage reported so far in the current turn.
    pub turn_usage: Usage,
    /// Last finish reason reported by the vendor.
    pub finish_reason: Option<FinishReason>,
    /// Citations collected over the whole request.
    pub citations: Vec<Citation>,
    /// Vendor content with no canonical event, collected over the whole request.
    pub additional_content: Vec<Value>,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    /// Create the state for a new logical request.
    pub fn new() -> Self {
        Self {
            message_id: new_id("msg"),
            reasoning_id: new_id("rsn"),
            stream_started: false,
            step_started: false,
            text_started: false,
            thinking_started: false,
            reasoning_used: false,
            current_text: String::new(),
            current_thinking: String::new(),
            thinking_signature: None,
            tool_call_fragments: BTreeMap::new(),
            finished_tool_calls: Vec::new(),
            provider_tools: BTreeMap::new(),
            usage: Usage::default(),
            turn_usage: Usage::default(),
            finish_reason: None,
            citations: Vec::new(),
            additional_content: Vec::new(),
        }
    }

    /// Clear turn-scoped fields before the next vendor turn.
    ///
    /// `stream_started`, `usage`, `citations` and `additional_content` are
    /// request-scoped and kept. Usage reported in the turn being discarded
    /// is folded into the cumulative total first.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::state::StreamState;
    /// use tributary_core::Usage;
    ///
    /// let mut state = StreamState::new();
    /// state.stream_started = true;
    /// state.turn_usage = Usage::new(10, 5);
    /// state.current_text.push_str("hello");
    /// let first_message = state.message_id.clone();
    ///
    /// state.reset();
    ///
    /// assert!(state.stream_started);
    /// assert_eq!(state.usage, Usage::new(10, 5));
    /// assert!(state.current_text.is_empty());
    /// assert_ne!(state.message_id, first_message);
    /// ```
    pub fn reset(&mut self) {
        self.fold_turn_usage();
        self.message_id = new_id("msg");
        self.reasoning_id = new_id("rsn");
        self.step_started = false;
        self.text_started = false;
        self.thinking_started = false;
        self.reasoning_used = false;
        self.current_text.clear();
        self.current_thinking.clear();
        self.thinking_signature = None;
        self.tool_call_fragments.clear();
        self.finished_tool_calls.clear();
        self.provider_tools.clear();
        self.finish_reason = None;
    }

    /// Add the current turn's usage to the cumulative total.
    pub fn fold_turn_usage(&mut self) {
        self.usage = self.usage.merge(&self.turn_usage);
        self.turn_usage = Usage::default();
    }

    /// Cumulative usage including the turn in progress.
    pub fn total_usage(&self) -> Usage {
        self.usage.merge(&self.turn_usage)
    }

    /// Replace the reasoning id so the next thinking block is distinct.
    pub fn next_reasoning_id(&mut self) {
        self.reasoning_id = new_id("rsn");
        self.reasoning_used = false;
    }

    /// Introduce a tool call at `index`.
    ///
    /// A repeated announcement of the same call (same or missing id) keeps
    /// the fragments collected so far. A different id at an occupied index
    /// finalizes the previous call first and returns it.
    pub fn start_tool_call(
        &mut self,
        index: usize,
        id: Option<String>,
        name: String,
    ) -> Option<ToolCall> {
        let mut replaced = None;
        if let Some(existing) = self.tool_call_fragments.get_mut(&index) {
            let same_call = id.is_none() || existing.id.is_none() || existing.id == id;
            if same_call {
                if existing.id.is_none() {
                    existing.id = id;
                }
                if existing.name.is_empty() {
                    existing.name = name;
                }
                return None;
            }
            replaced = self.finalize_tool_call(index);
        }

        self.tool_call_fragments.insert(
            index,
            PartialToolCall {
                id,
                name,
                arguments: String::new(),
            },
        );
        replaced
    }

    /// Append an argument fragment to the call at `index`.
    ///
    /// Returns the call's id and name as known so far; the id is empty for
    /// fragments that arrive before their call was announced.
    pub fn append_tool_args(&mut self, index: usize, fragment: &str) -> (String, String) {
        let partial = self.tool_call_fragments.entry(index).or_default();
        partial.arguments.push_str(fragment);
        (
            partial.id.clone().unwrap_or_default(),
            partial.name.clone(),
        )
    }

    /// Finalize the call at `index`, parsing its accumulated arguments.
    pub fn finalize_tool_call(&mut self, index: usize) -> Option<ToolCall> {
        let partial = self.tool_call_fragments.remove(&index)?;
        let call = self.build_call(partial.id, partial.name, |id, name| {
            ToolCall::from_fragments(id, name, &partial.arguments)
        });
        self.finished_tool_calls.push(call.clone());
        Some(call)
    }

    /// Finalize every pending call in index order.
    pub fn finalize_all_tool_calls(&mut self) -> Vec<ToolCall> {
        let indices: Vec<usize> = self.tool_call_fragments.keys().copied().collect();
        indices
            .into_iter()
            .filter_map(|index| self.finalize_tool_call(index))
            .collect()
    }

    /// Record a call delivered whole.
    pub fn push_whole_tool_call(&mut self, id: Option<String>, name: String, arguments: Value) -> ToolCall {
        let call = self.build_call(id, name, |id, name| ToolCall::from_value(id, name, arguments));
        self.finished_tool_calls.push(call.clone());
        call
    }

    /// Whether the turn produced (or is producing) tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.finished_tool_calls.is_empty() || !self.tool_call_fragments.is_empty()
    }

    fn build_call(
        &self,
        id: Option<String>,
        name: String,
        make: impl FnOnce(String, String) -> ToolCall,
    ) -> ToolCall {
        let id = id.filter(|id| !id.is_empty()).unwrap_or_else(|| new_id("call"));
        let mut call = make(id, name).with_result_id(new_id("res"));
        if self.reasoning_used {
            call = call.with_reasoning_id(self.reasoning_id.clone());
        }
        call
    }
}

/// Generate a prefixed random id.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragments_assemble_across_chunks() {
        let mut state = StreamState::new();
        state.start_tool_call(0, Some("call_1".into()), "echo".into());
        state.append_tool_args(0, "{\"inp");
        state.append_tool_args(0, "ut\":\"wor");
        state.append_tool_args(0, "ld\"}");

        let call = state.finalize_tool_call(0).unwrap();
        assert_eq!(call.id(), "call_1");
        assert_eq!(call.arguments_value(), json!({"input": "world"}));
        assert!(call.result_id().is_some());
        assert!(state.tool_call_fragments.is_empty());
    }

    #[test]
    fn test_unparseable_fragments_kept_as_raw() {
        let mut state = StreamState::new();
        state.start_tool_call(0, Some("call_1".into()), "echo".into());
        state.append_tool_args(0, "{\"input\": \"wor");
        let call = state.finalize_tool_call(0).unwrap();
        assert_eq!(call.arguments()["raw"], json!("{\"input\": \"wor"));
    }

    #[test]
    fn test_repeated_start_keeps_fragments() {
        let mut state = StreamState::new();
        state.start_tool_call(0, Some("call_1".into()), "echo".into());
        state.append_tool_args(0, "{\"a\":");
        assert!(state.start_tool_call(0, Some("call_1".into()), "echo".into()).is_none());
        state.append_tool_args(0, "1}");

        let call = state.finalize_tool_call(0).unwrap();
        assert_eq!(call.arguments()["a"], json!(1));
    }

    #[test]
    fn test_new_id_at_same_index_finalizes_previous() {
        let mut state = StreamState::new();
        state.start_tool_call(0, Some("call_1".into()), "a".into());
        state.append_tool_args(0, "{}");
        let previous = state.start_tool_call(0, Some("call_2".into()), "b".into());

        assert_eq!(previous.unwrap().id(), "call_1");
        assert_eq!(state.tool_call_fragments[&0].name, "b");
        assert!(state.tool_call_fragments[&0].arguments.is_empty());
    }

    #[test]
    fn test_finalize_all_in_index_order() {
        let mut state = StreamState::new();
        state.start_tool_call(2, Some("c2".into()), "b".into());
        state.start_tool_call(0, Some("c0".into()), "a".into());
        let calls = state.finalize_all_tool_calls();
        let ids: Vec<&str> = calls.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c0", "c2"]);
        assert_eq!(state.finished_tool_calls.len(), 2);
    }

    #[test]
    fn test_args_before_start_are_kept() {
        let mut state = StreamState::new();
        let (id, name) = state.append_tool_args(3, "{\"a\":");
        assert!(id.is_empty());
        assert!(name.is_empty());

        state.start_tool_call(3, Some("call_9".into()), "late".into());
        state.append_tool_args(3, "2}");
        let call = state.finalize_tool_call(3).unwrap();
        assert_eq!(call.id(), "call_9");
        assert_eq!(call.name(), "late");
        assert_eq!(call.arguments()["a"], json!(2));
    }

    #[test]
    fn test_whole_call_gets_id_and_reasoning() {
        let mut state = StreamState::new();
        state.reasoning_used = true;
        let call = state.push_whole_tool_call(None, "lookup".into(), json!({"q": "x"}));
        assert!(call.id().starts_with("call_"));
        assert_eq!(call.reasoning_id(), Some(state.reasoning_id.as_str()));
        assert!(state.has_tool_calls());
    }

    #[test]
    fn test_reset_keeps_request_scope() {
        let mut state = StreamState::new();
        state.stream_started = true;
        state.step_started = true;
        state.text_started = true;
        state.turn_usage = Usage::new(3, 2);
        state.usage = Usage::new(10, 5);
        state.additional_content.push(json!({"type": "web_search_tool_result"}));
        state.start_tool_call(0, None, "echo".into());
        state.finish_reason = Some(FinishReason::ToolCalls);

        state.reset();

        assert!(state.stream_started);
        assert!(!state.step_started);
        assert!(!state.text_started);
        assert_eq!(state.usage, Usage::new(13, 7));
        assert_eq!(state.turn_usage, Usage::default());
        assert_eq!(state.additional_content.len(), 1);
        assert!(state.tool_call_fragments.is_empty());
        assert!(state.finish_reason.is_none());
    }
}
