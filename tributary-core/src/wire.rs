//! Wire framing for vendor response bodies.
//!
//! Splits a raw response byte stream into [`Frame`]s (one SSE event or one
//! JSON line each) and defines [`Chunk`], the key-path addressable JSON
//! payload that decoders produce from a frame.

use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::transport::TransportError;

/// Sentinel data payload that terminates chat-completions SSE streams.
pub const SSE_DONE_MARKER: &str = "[DONE]";

/// Errors raised while turning bytes into chunks.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A frame payload was not valid JSON.
    #[error("malformed {vendor} payload: {source}")]
    MalformedPayload {
        /// Vendor whose frame failed to decode.
        vendor: &'static str,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The SSE stream itself was malformed.
    #[error("malformed event stream: {0}")]
    EventStream(String),

    /// A JSON line was not valid UTF-8.
    #[error("invalid UTF-8 in response line: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Transport(#[from] TransportError),
}

/// How a vendor frames its streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-Sent Events (`event:` / `data:` lines separated by blank lines).
    Sse,
    /// One complete JSON object per line.
    JsonLines,
}

/// One unit of a response body: an SSE event or a JSON line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// SSE event name, if the frame carried one.
    pub event: Option<String>,
    /// Frame payload.
    pub data: String,
}

impl Frame {
    /// Create a frame without an event name.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Create a frame with an SSE event name.
    pub fn event(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Whether the payload is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.data.trim().is_empty()
    }
}

/// Boxed stream of frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, DecodeError>> + Send>>;

/// Split a response body into frames.
///
/// The returned stream is lazy: bytes are only pulled from `body` as frames
/// are requested, and dropping the stream drops the body.
pub fn frames<S>(body: S, framing: Framing) -> FrameStream
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    match framing {
        Framing::Sse => Box::pin(body.eventsource().map(|event| match event {
            Ok(event) => Ok(Frame {
                event: (!event.event.is_empty() && event.event != "message")
                    .then_some(event.event),
                data: event.data,
            }),
            Err(EventStreamError::Transport(e)) => Err(DecodeError::Transport(e)),
            Err(EventStreamError::Utf8(e)) => Err(DecodeError::InvalidUtf8(e)),
            Err(e @ EventStreamError::Parser(_)) => Err(DecodeError::EventStream(e.to_string())),
        })),
        Framing::JsonLines => json_lines(body),
    }
}

/// Split a byte stream on `\n`, yielding each non-empty line as a frame.
///
/// Lines may span network chunks; a trailing line without a newline is
/// still yielded when the body ends.
fn json_lines<S>(body: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();
        // Bytes before this offset are known to hold no newline.
        let mut scanned = 0;

        while let Some(bytes) = body.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(DecodeError::Transport(e));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=scanned + pos).collect();
                scanned = 0;
                match line_frame(line) {
                    Ok(Some(frame)) => yield Ok(frame),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            scanned = buffer.len();
        }

        match line_frame(std::mem::take(&mut buffer)) {
            Ok(Some(frame)) => yield Ok(frame),
            Ok(None) => {}
            Err(e) => yield Err(e),
        }
    })
}

fn line_frame(line: Vec<u8>) -> Result<Option<Frame>, DecodeError> {
    let line = String::from_utf8(line)?;
    let line = line.trim();
    Ok((!line.is_empty()).then(|| Frame::data(line)))
}

/// A decoded frame payload with key-path access.
///
/// # Examples
///
/// ```
/// use tributary_core::wire::Chunk;
///
/// let chunk = Chunk::new(serde_json::json!({
///     "choices": [{"delta": {"content": "Hi"}}]
/// }));
/// assert_eq!(chunk.str_at("/choices/0/delta/content"), Some("Hi"));
/// assert!(chunk.at("/choices/1").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// SSE event name of the source frame.
    pub event: Option<String>,
    value: Value,
}

impl Chunk {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Self { event: None, value }
    }

    /// Parse a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] tagged with `vendor` when
    /// the payload is not valid JSON.
    pub fn parse(vendor: &'static str, frame: &Frame) -> Result<Self, DecodeError> {
        let value = serde_json::from_str(&frame.data)
            .map_err(|source| DecodeError::MalformedPayload { vendor, source })?;
        Ok(Self {
            event: frame.event.clone(),
            value,
        })
    }

    /// The whole payload.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Value at a JSON pointer path (`/choices/0/delta`).
    pub fn at(&self, path: &str) -> Option<&Value> {
        self.value.pointer(path).filter(|v| !v.is_null())
    }

    /// String at a path.
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.at(path).and_then(Value::as_str)
    }

    /// Unsigned integer at a path.
    pub fn u64_at(&self, path: &str) -> Option<u64> {
        self.at(path).and_then(Value::as_u64)
    }

    /// Boolean at a path.
    pub fn bool_at(&self, path: &str) -> Option<bool> {
        self.at(path).and_then(Value::as_bool)
    }
}
