//! Anthropic Messages SSE decoding.

use serde_json::Value;

use crate::decoder::{Decoder, Delta, decode_sse_json};
use crate::event::{Citation, FinishReason, ProviderToolStatus};
use crate::usage::UsageUpdate;
use crate::wire::{Chunk, DecodeError, Frame, Framing};

/// Error types that abort the turn.
const FATAL_ERROR_TYPES: &[&str] = &["rate_limit_error", "authentication_error"];

/// Decoder for Anthropic Messages SSE streams.
///
/// Content blocks are addressed by their `index`; the accumulator keys
/// tool calls and server tool blocks by that index, so this decoder itself
/// holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicDecoder;

impl Decoder for AnthropicDecoder {
    fn vendor(&self) -> &'static str {
        "anthropic"
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn decode(&self, frame: &Frame) -> Result<Option<Chunk>, DecodeError> {
        if frame.event.as_deref() == Some("ping") {
            return Ok(None);
        }
        decode_sse_json(self.vendor(), frame)
    }

    fn deltas(&self, chunk: &Chunk) -> Vec<Delta> {
        let index = chunk.u64_at("/index").map_or(0, |i| i as usize);
        let event = chunk
            .str_at("/type")
            .or(chunk.event.as_deref())
            .unwrap_or_default();
        match event {
            "message_start" => message_start(chunk),
            "content_block_start" => match chunk.at("/content_block") {
                Some(block) => block_start(index, block),
                None => Vec::new(),
            },
            "content_block_delta" => match chunk.at("/delta") {
                Some(delta) => block_delta(index, delta),
                None => Vec::new(),
            },
            "content_block_stop" => vec![Delta::BlockStop { index }],
            "message_delta" => message_delta(chunk),
            "message_stop" => vec![Delta::TurnDone],
            "error" => vec![vendor_error(chunk.at("/error"))],
            "ping" => Vec::new(),
            other => {
                tracing::debug!(event = other, "anthropic: ignoring unknown event");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event handlers
// ---------------------------------------------------------------------------

fn message_start(chunk: &Chunk) -> Vec<Delta> {
    let mut deltas = vec![Delta::MessageStart {
        id: chunk.str_at("/message/id").map(str::to_string),
        model: chunk.str_at("/message/model").map(str::to_string),
    }];
    if let Some(usage) = chunk.at("/message/usage").and_then(usage_update) {
        deltas.push(Delta::Usage(usage));
    }
    deltas
}

fn block_start(index: usize, block: &Value) -> Vec<Delta> {
    let field = |name: &str| block.get(name).and_then(Value::as_str).unwrap_or_default();
    let block_type = field("type");

    match block_type {
        "text" => non_empty(field("text")).map(Delta::Text).into_iter().collect(),
        "thinking" => {
            let mut deltas: Vec<Delta> = non_empty(field("thinking"))
                .map(Delta::Thinking)
                .into_iter()
                .collect();
            deltas.extend(non_empty(field("signature")).map(Delta::ThinkingSignature));
            deltas
        }
        "redacted_thinking" => vec![Delta::Opaque(block.clone())],
        "tool_use" => vec![Delta::ToolCallStart {
            index,
            id: non_empty(field("id")),
            name: field("name").to_string(),
        }],
        "server_tool_use" => vec![Delta::ProviderToolStart {
            index,
            tool_type: field("name").to_string(),
            item_id: field("id").to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        }],
        other if other.ends_with("_tool_result") => {
            let failed = block
                .pointer("/content/type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.ends_with("_error"));
            vec![Delta::ProviderToolResult {
                tool_type: other.trim_end_matches("_tool_result").to_string(),
                item_id: field("tool_use_id").to_string(),
                status: if failed {
                    ProviderToolStatus::Failed
                } else {
                    ProviderToolStatus::Completed
                },
                data: block.clone(),
            }]
        }
        other => {
            tracing::debug!(block_type = other, "anthropic: ignoring unknown block");
            Vec::new()
        }
    }
}

fn block_delta(index: usize, delta: &Value) -> Vec<Delta> {
    let field = |name: &str| {
        delta
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    match delta.get("type").and_then(Value::as_str).unwrap_or_default() {
        "text_delta" => vec![Delta::Text(field("text"))],
        "thinking_delta" => vec![Delta::Thinking(field("thinking"))],
        "signature_delta" => vec![Delta::ThinkingSignature(field("signature"))],
        "input_json_delta" => vec![Delta::ToolCallArgs {
            index,
            fragment: field("partial_json"),
        }],
        "citations_delta" => delta
            .get("citation")
            .map(|citation| Delta::Citation {
                citation: to_citation(citation),
                block_index: index,
            })
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn message_delta(chunk: &Chunk) -> Vec<Delta> {
    let mut deltas = Vec::new();
    if let Some(usage) = chunk.at("/usage").and_then(usage_update) {
        deltas.push(Delta::Usage(usage));
    }
    if let Some(reason) = chunk.str_at("/delta/stop_reason") {
        deltas.push(Delta::Finish(map_stop_reason(reason)));
    }
    deltas
}

fn vendor_error(error: Option<&Value>) -> Delta {
    let field = |name: &str| {
        error
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let error_type = field("type").unwrap_or_else(|| "error".to_string());
    let fatal = FATAL_ERROR_TYPES.contains(&error_type.as_str());
    Delta::VendorError {
        message: field("message").unwrap_or_else(|| "unknown error".to_string()),
        error_type,
        fatal,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map an Anthropic `stop_reason`.
pub(super) fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

fn usage_update(usage: &Value) -> Option<UsageUpdate> {
    let counter = |name: &str| usage.get(name).and_then(Value::as_u64);
    let update = UsageUpdate {
        prompt_tokens: counter("input_tokens"),
        completion_tokens: counter("output_tokens"),
        cache_write_input_tokens: counter("cache_creation_input_tokens"),
        cache_read_input_tokens: counter("cache_read_input_tokens"),
        thought_tokens: None,
    };
    (!update.is_empty()).then_some(update)
}

fn to_citation(citation: &Value) -> Citation {
    let field = |name: &str| citation.get(name).and_then(Value::as_str).map(str::to_string);
    Citation {
        citation_type: field("type").unwrap_or_else(|| "citation".to_string()),
        cited_text: field("cited_text"),
        url: field("url"),
        title: field("title").or_else(|| field("document_title")),
        raw: citation.clone(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
