//! Wire decoder interface.
//!
//! A [`Decoder`] turns one [`Frame`] into an optional [`Chunk`] and then
//! extracts the vendor-neutral [`Delta`]s the accumulator understands.
//! Decoders hold no per-turn state: block bookkeeping lives in
//! [`StreamState`](crate::state::StreamState), so one decoder value can serve
//! any number of turns.

use serde_json::Value;

use crate::event::{Citation, FinishReason, ProviderToolStatus};
use crate::usage::UsageUpdate;
use crate::wire::{Chunk, DecodeError, Frame, Framing};

/// One normalized piece of information extracted from a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// The vendor announced the assistant message.
    MessageStart {
        /// Vendor message id.
        id: Option<String>,
        /// Model that is answering.
        model: Option<String>,
    },
    /// A text fragment.
    Text(String),
    /// A reasoning fragment.
    Thinking(String),
    /// Signature of the current reasoning block.
    ThinkingSignature(String),
    /// A tool call was introduced at `index`; its argument buffer starts empty.
    ToolCallStart {
        /// Position of the call in the turn.
        index: usize,
        /// Vendor call id.
        id: Option<String>,
        /// Tool name.
        name: String,
    },
    /// A raw argument fragment for the call at `index`.
    ToolCallArgs {
        /// Position of the call in the turn.
        index: usize,
        /// Partial JSON text.
        fragment: String,
    },
    /// A tool call delivered whole.
    ToolCall {
        /// Vendor call id.
        id: Option<String>,
        /// Tool name.
        name: String,
        /// Parsed arguments.
        arguments: Value,
    },
    /// The content block at `index` closed.
    BlockStop {
        /// Block index.
        index: usize,
    },
    /// Token counters reported by this chunk.
    Usage(UsageUpdate),
    /// The vendor reported why the turn finished.
    Finish(FinishReason),
    /// The vendor signalled the end of the turn without a reason.
    TurnDone,
    /// A vendor-executed tool started at `index`.
    ProviderToolStart {
        /// Block index.
        index: usize,
        /// Vendor tool type (e.g. `web_search`).
        tool_type: String,
        /// Vendor item id.
        item_id: String,
        /// Input known when the block opened.
        input: Value,
    },
    /// A vendor-executed tool produced its result.
    ProviderToolResult {
        /// Vendor tool type.
        tool_type: String,
        /// Vendor item id of the originating call.
        item_id: String,
        /// Completed or failed.
        status: ProviderToolStatus,
        /// Result payload.
        data: Value,
    },
    /// Vendor content the caller must keep verbatim (e.g. redacted reasoning).
    Opaque(Value),
    /// A citation for the text block at `block_index`.
    Citation {
        /// The citation.
        citation: Citation,
        /// Block index.
        block_index: usize,
    },
    /// An error reported inside the stream.
    VendorError {
        /// Vendor error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Whether the turn must be aborted.
        fatal: bool,
    },
}

/// A stateless per-vendor wire decoder.
///
/// Implementations must be thread-safe (`Send + Sync`) so a provider can
/// share one decoder across concurrent requests.
pub trait Decoder: Send + Sync {
    /// Vendor tag used in errors and logs.
    fn vendor(&self) -> &'static str;

    /// How the vendor frames its response body.
    fn framing(&self) -> Framing;

    /// Decode one frame.
    ///
    /// Returns `Ok(None)` for frames that carry nothing (blank lines, pings,
    /// the `[DONE]` sentinel).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] when the payload is not
    /// valid JSON. This aborts the turn.
    fn decode(&self, frame: &Frame) -> Result<Option<Chunk>, DecodeError>;

    /// Extract the deltas carried by a decoded chunk, in order.
    fn deltas(&self, chunk: &Chunk) -> Vec<Delta>;
}

/// Parse an SSE frame, skipping blank payloads and the `[DONE]` sentinel.
pub(crate) fn decode_sse_json(
    vendor: &'static str,
    frame: &Frame,
) -> Result<Option<Chunk>, DecodeError> {
    if frame.is_blank() || frame.data.trim() == crate::wire::SSE_DONE_MARKER {
        return Ok(None);
    }
    Chunk::parse(vendor, frame).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sse_json_skips_sentinels() {
        assert!(decode_sse_json("test", &Frame::data("")).unwrap().is_none());
        assert!(decode_sse_json("test", &Frame::data("  \n")).unwrap().is_none());
        assert!(decode_sse_json("test", &Frame::data("[DONE]")).unwrap().is_none());
    }

    #[test]
    fn test_decode_sse_json_parses_payload() {
        let chunk = decode_sse_json("test", &Frame::data(r#"{"a":1}"#))
            .unwrap()
            .unwrap();
        assert_eq!(chunk.u64_at("/a"), Some(1));
    }

    #[test]
    fn test_decode_sse_json_malformed_is_fatal() {
        let err = decode_sse_json("groq", &Frame::data("{\"a\":")).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload { vendor: "groq", .. }));
    }
}
