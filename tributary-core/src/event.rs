//! Canonical stream events.
//!
//! Every vendor protocol is normalized into the closed [`EventKind`] set
//! defined here. Each event is wrapped in a [`StreamEvent`] envelope that
//! carries a unique id and a timestamp.
//!
//! For one logical request the sequence always contains exactly one
//! [`EventKind::StreamStart`] and one [`EventKind::StreamEnd`], with one
//! [`EventKind::StepStart`]/[`EventKind::StepFinish`] pair per vendor turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Artifact, ToolCall, ToolResult};
use crate::usage::Usage;

/// Why a turn (or the whole request) finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model finished naturally.
    Stop,
    /// The output token limit was reached.
    Length,
    /// The model requested tool calls.
    ToolCalls,
    /// Output was withheld by a content filter.
    ContentFilter,
    /// The vendor reported an error.
    Error,
    /// A vendor-specific reason with no canonical equivalent.
    Other(String),
    /// The stream ended without a finish reason.
    Unknown,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => f.write_str("stop"),
            FinishReason::Length => f.write_str("length"),
            FinishReason::ToolCalls => f.write_str("tool_calls"),
            FinishReason::ContentFilter => f.write_str("content_filter"),
            FinishReason::Error => f.write_str("error"),
            FinishReason::Other(reason) => f.write_str(reason),
            FinishReason::Unknown => f.write_str("unknown"),
        }
    }
}

/// A source citation attached to generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Vendor citation type (e.g. `web_search_result_location`, `url_citation`).
    pub citation_type: String,
    /// The cited passage, when the vendor supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_text: Option<String>,
    /// Source URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The complete vendor payload.
    pub raw: Value,
}

/// Progress of a tool executed by the vendor itself (e.g. web search).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderToolStatus {
    /// The vendor announced the tool call.
    Started,
    /// The tool input finished streaming.
    InputAvailable,
    /// The vendor delivered the tool result.
    Completed,
    /// The vendor reported a tool failure.
    Failed,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// The logical request started.
    StreamStart {
        /// Model identifier.
        model: String,
        /// Vendor name.
        provider: String,
    },
    /// A vendor turn started.
    StepStart {},
    /// A vendor turn (and its tool batch, if any) finished.
    StepFinish {},
    /// Text output started.
    TextStart {
        /// Id of the assistant message.
        message_id: String,
    },
    /// A fragment of text output.
    TextDelta {
        /// The fragment.
        delta: String,
        /// Id of the assistant message.
        message_id: String,
    },
    /// Text output finished.
    TextComplete {
        /// Id of the assistant message.
        message_id: String,
    },
    /// Reasoning output started.
    ThinkingStart {
        /// Id of the reasoning block.
        reasoning_id: String,
    },
    /// A fragment of reasoning output.
    ThinkingDelta {
        /// The fragment.
        delta: String,
        /// Id of the reasoning block.
        reasoning_id: String,
    },
    /// Reasoning output finished.
    ThinkingComplete {
        /// Id of the reasoning block.
        reasoning_id: String,
    },
    /// A complete tool call.
    ToolCall {
        /// The call.
        tool_call: ToolCall,
        /// Id of the assistant message.
        message_id: String,
    },
    /// A raw fragment of tool-call arguments.
    ToolCallDelta {
        /// Call id.
        tool_id: String,
        /// Tool name.
        tool_name: String,
        /// Partial JSON argument text, exactly as the vendor sent it.
        delta: String,
        /// Id of the assistant message.
        message_id: String,
    },
    /// The result of a locally executed tool.
    ToolResult {
        /// The result.
        tool_result: ToolResult,
        /// Id of the assistant message.
        message_id: String,
        /// Whether the call succeeded.
        success: bool,
        /// Error text for failed calls.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A binary artifact produced by a tool.
    Artifact {
        /// The artifact.
        artifact: Artifact,
        /// Id of the call that produced it.
        tool_call_id: String,
        /// Name of the tool that produced it.
        tool_name: String,
        /// Id of the assistant message.
        message_id: String,
    },
    /// Progress of a vendor-executed tool.
    ProviderTool {
        /// Vendor tool type (e.g. `web_search`).
        tool_type: String,
        /// Progress status.
        status: ProviderToolStatus,
        /// Vendor item id.
        item_id: String,
        /// Input or result payload.
        data: Value,
    },
    /// A citation for generated text.
    Citation {
        /// The citation.
        citation: Citation,
        /// Id of the assistant message.
        message_id: String,
        /// Content block the citation belongs to.
        block_index: usize,
    },
    /// An error reported by the vendor inside the stream.
    Error {
        /// Vendor error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Whether the stream continues after this error.
        recoverable: bool,
    },
    /// The logical request finished.
    StreamEnd {
        /// Finish reason of the last turn.
        finish_reason: FinishReason,
        /// Usage accumulated over all turns.
        usage: Usage,
        /// Citations collected over all turns.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        citations: Vec<Citation>,
        /// Vendor content with no canonical event (e.g. provider tool results).
        #[serde(skip_serializing_if = "Vec::is_empty")]
        additional_content: Vec<Value>,
    },
}

/// A canonical event with its envelope.
///
/// # Examples
///
/// ```
/// use tributary_core::event::{EventKind, StreamEvent};
///
/// let event = StreamEvent::new(EventKind::StepStart {});
/// assert!(event.is_step_start());
/// assert!(!event.id.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    /// Unique, time-ordered event id.
    pub id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl StreamEvent {
    /// Wrap `kind` in a fresh envelope.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Whether this is the request-level start event.
    pub fn is_stream_start(&self) -> bool {
        matches!(self.kind, EventKind::StreamStart { .. })
    }

    /// Whether this is the request-level end event.
    pub fn is_stream_end(&self) -> bool {
        matches!(self.kind, EventKind::StreamEnd { .. })
    }

    /// Whether this opens a vendor turn.
    pub fn is_step_start(&self) -> bool {
        matches!(self.kind, EventKind::StepStart {})
    }

    /// Whether this closes a vendor turn.
    pub fn is_step_finish(&self) -> bool {
        matches!(self.kind, EventKind::StepFinish {})
    }

    /// Text fragment carried by a [`EventKind::TextDelta`].
    pub fn text_delta(&self) -> Option<&str> {
        match &self.kind {
            EventKind::TextDelta { delta, .. } => Some(delta),
            _ => None,
        }
    }
}

impl From<EventKind> for StreamEvent {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        let a = StreamEvent::new(EventKind::StepStart {});
        let b = StreamEvent::new(EventKind::StepStart {});
        assert_ne!(a.id, b.id);
        assert!(a.timestamp <= b.timestamp);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = StreamEvent::new(EventKind::TextDelta {
            delta: "Hi".to_string(),
            message_id: "msg_1".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["delta"], "Hi");
        assert_eq!(json["messageId"], "msg_1");
        assert!(json["id"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_stream_end_serialization_skips_empty_lists() {
        let event = StreamEvent::new(EventKind::StreamEnd {
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::new(1, 2),
            citations: Vec::new(),
            additional_content: Vec::new(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stream_end");
        assert_eq!(json["finishReason"], "tool_calls");
        assert_eq!(json["usage"]["promptTokens"], 1);
        assert!(json.get("citations").is_none());
    }

    #[test]
    fn test_finish_reason_display() {
        assert_eq!(FinishReason::ToolCalls.to_string(), "tool_calls");
        assert_eq!(FinishReason::Other("pause_turn".into()).to_string(), "pause_turn");
    }

    #[test]
    fn test_predicates() {
        let end = StreamEvent::new(EventKind::StreamEnd {
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            citations: Vec::new(),
            additional_content: Vec::new(),
        });
        assert!(end.is_stream_end());
        assert!(!end.is_stream_start());
        assert_eq!(end.text_delta(), None);
    }
}
