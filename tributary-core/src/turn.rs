//! Turn processor.
//!
//! Consumes the [`Delta`]s of one vendor turn, updates the borrowed
//! [`StreamState`] and yields canonical events. The processor never executes
//! tools; a turn that ends with tool calls hands them back in its
//! [`TurnOutcome`].

#[cfg(test)]
mod tests;

use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::decoder::{Decoder, Delta};
use crate::event::{EventKind, FinishReason, ProviderToolStatus, StreamEvent};
use crate::message::{Reasoning, ToolCall};
use crate::state::{ProviderToolBlock, StreamState};
use crate::transport::ByteStream;
use crate::usage::Usage;
use crate::wire::{self, DecodeError};

/// Phase of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No delta seen yet.
    AwaitingFirstChunk,
    /// Content is arriving.
    Streaming,
    /// The vendor finished with tool calls.
    ToolCallsPending,
    /// The vendor finished without tool calls.
    NaturalFinish,
    /// [`TurnProcessor::finish`] ran.
    Done,
}

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// All text of the turn.
    pub text: String,
    /// Reasoning of the turn, with its signature.
    pub reasoning: Option<Reasoning>,
    /// Finalized tool calls, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Why the turn finished. `ToolCalls` whenever tool calls are present.
    pub finish_reason: FinishReason,
    /// Usage reported for this turn alone.
    pub usage: Usage,
}

impl TurnOutcome {
    /// Whether the model requested tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A vendor error that aborts the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorFailure {
    /// Vendor error type.
    pub error_type: String,
    /// Error message.
    pub message: String,
}

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The response body could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The vendor reported a fatal error inside the stream.
    #[error("{vendor} stream error ({error_type}): {message}")]
    Vendor {
        /// Vendor tag.
        vendor: &'static str,
        /// Vendor error type.
        error_type: String,
        /// Error message.
        message: String,
    },
}

/// Applies deltas for exactly one vendor turn.
#[derive(Debug)]
pub struct TurnProcessor<'a> {
    state: &'a mut StreamState,
    phase: TurnPhase,
    fatal: Option<VendorFailure>,
}

impl<'a> TurnProcessor<'a> {
    /// Start processing a turn against `state`.
    pub fn new(state: &'a mut StreamState) -> Self {
        Self {
            state,
            phase: TurnPhase::AwaitingFirstChunk,
            fatal: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Apply one delta and return the events it produces.
    pub fn apply(&mut self, delta: Delta) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.phase == TurnPhase::AwaitingFirstChunk {
            self.phase = TurnPhase::Streaming;
        }

        match delta {
            Delta::MessageStart { id, model } => {
                tracing::debug!(?id, ?model, "turn: message start");
                if let Some(id) = id
                    && !self.state.text_started
                    && self.state.current_text.is_empty()
                {
                    self.state.message_id = id;
                }
            }
            Delta::Text(text) => self.push_text(text, &mut events),
            Delta::Thinking(text) => self.push_thinking(text, &mut events),
            Delta::ThinkingSignature(signature) => {
                self.state
                    .thinking_signature
                    .get_or_insert_with(String::new)
                    .push_str(&signature);
            }
            Delta::ToolCallStart { index, id, name } => {
                if let Some(previous) = self.state.start_tool_call(index, id, name) {
                    events.push(self.tool_call_event(previous));
                }
            }
            Delta::ToolCallArgs { index, fragment } => {
                if let Some(block) = self.state.provider_tools.get_mut(&index) {
                    block.streamed_input.push_str(&fragment);
                } else if !fragment.is_empty() {
                    let (tool_id, tool_name) = self.state.append_tool_args(index, &fragment);
                    events.push(StreamEvent::new(EventKind::ToolCallDelta {
                        tool_id,
                        tool_name,
                        delta: fragment,
                        message_id: self.state.message_id.clone(),
                    }));
                }
            }
            Delta::ToolCall {
                id,
                name,
                arguments,
            } => {
                let call = self.state.push_whole_tool_call(id, name, arguments);
                events.push(self.tool_call_event(call));
            }
            Delta::BlockStop { index } => {
                if let Some(call) = self.state.finalize_tool_call(index) {
                    events.push(self.tool_call_event(call));
                } else if let Some(block) = self.state.provider_tools.remove(&index) {
                    events.push(provider_input_event(block));
                }
            }
            Delta::Usage(update) => self.state.turn_usage.overlay(&update),
            Delta::Finish(reason) => {
                tracing::debug!(%reason, "turn: finish reason");
                self.state.finish_reason = Some(reason);
                self.finalize_pending(&mut events);
            }
            Delta::TurnDone => self.finalize_pending(&mut events),
            Delta::ProviderToolStart {
                index,
                tool_type,
                item_id,
                input,
            } => {
                events.push(StreamEvent::new(EventKind::ProviderTool {
                    tool_type: tool_type.clone(),
                    status: ProviderToolStatus::Started,
                    item_id: item_id.clone(),
                    data: input.clone(),
                }));
                self.state.provider_tools.insert(
                    index,
                    ProviderToolBlock {
                        tool_type,
                        item_id,
                        input,
                        streamed_input: String::new(),
                    },
                );
            }
            Delta::ProviderToolResult {
                tool_type,
                item_id,
                status,
                data,
            } => {
                self.state.additional_content.push(data.clone());
                events.push(StreamEvent::new(EventKind::ProviderTool {
                    tool_type,
                    status,
                    item_id,
                    data,
                }));
            }
            Delta::Opaque(content) => self.state.additional_content.push(content),
            Delta::Citation {
                citation,
                block_index,
            } => {
                self.state.citations.push(citation.clone());
                events.push(StreamEvent::new(EventKind::Citation {
                    citation,
                    message_id: self.state.message_id.clone(),
                    block_index,
                }));
            }
            Delta::VendorError {
                error_type,
                message,
                fatal,
            } => {
                tracing::debug!(%error_type, fatal, "turn: vendor error");
                events.push(StreamEvent::new(EventKind::Error {
                    error_type: error_type.clone(),
                    message: message.clone(),
                    recoverable: !fatal,
                }));
                if fatal {
                    self.state.finish_reason = Some(FinishReason::Error);
                    self.fatal = Some(VendorFailure {
                        error_type,
                        message,
                    });
                }
            }
        }

        events
    }

    /// Take the fatal vendor error recorded by the last [`apply`](Self::apply).
    pub fn take_fatal(&mut self) -> Option<VendorFailure> {
        self.fatal.take()
    }

    /// End the turn: finalize pending tool calls and close open channels.
    pub fn finish(mut self) -> (Vec<StreamEvent>, TurnOutcome) {
        let mut events = Vec::new();
        self.finalize_pending(&mut events);
        self.close_thinking(&mut events);
        self.close_text(&mut events);

        let tool_calls = self.state.finished_tool_calls.clone();
        let finish_reason = if tool_calls.is_empty() {
            self.state
                .finish_reason
                .clone()
                .unwrap_or(FinishReason::Unknown)
        } else {
            FinishReason::ToolCalls
        };
        self.state.finish_reason = Some(finish_reason.clone());

        let reasoning = (!self.state.current_thinking.is_empty()
            || self.state.thinking_signature.is_some())
        .then(|| Reasoning {
            text: self.state.current_thinking.clone(),
            signature: self.state.thinking_signature.clone(),
        });

        self.phase = TurnPhase::Done;
        tracing::debug!(
            tool_calls = tool_calls.len(),
            %finish_reason,
            "turn: finished"
        );

        let outcome = TurnOutcome {
            text: self.state.current_text.clone(),
            reasoning,
            tool_calls,
            finish_reason,
            usage: self.state.turn_usage,
        };
        (events, outcome)
    }

    fn push_text(&mut self, text: String, events: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        self.close_thinking(events);
        if !self.state.text_started {
            self.state.text_started = true;
            events.push(StreamEvent::new(EventKind::TextStart {
                message_id: self.state.message_id.clone(),
            }));
        }
        self.state.current_text.push_str(&text);
        events.push(StreamEvent::new(EventKind::TextDelta {
            delta: text,
            message_id: self.state.message_id.clone(),
        }));
    }

    fn push_thinking(&mut self, text: String, events: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        self.close_text(events);
        if !self.state.thinking_started {
            if self.state.reasoning_used {
                self.state.next_reasoning_id();
            }
            self.state.thinking_started = true;
            self.state.reasoning_used = true;
            events.push(StreamEvent::new(EventKind::ThinkingStart {
                reasoning_id: self.state.reasoning_id.clone(),
            }));
        }
        self.state.current_thinking.push_str(&text);
        events.push(StreamEvent::new(EventKind::ThinkingDelta {
            delta: text,
            reasoning_id: self.state.reasoning_id.clone(),
        }));
    }

    fn close_text(&mut self, events: &mut Vec<StreamEvent>) {
        if self.state.text_started {
            self.state.text_started = false;
            events.push(StreamEvent::new(EventKind::TextComplete {
                message_id: self.state.message_id.clone(),
            }));
        }
    }

    fn close_thinking(&mut self, events: &mut Vec<StreamEvent>) {
        if self.state.thinking_started {
            self.state.thinking_started = false;
            events.push(StreamEvent::new(EventKind::ThinkingComplete {
                reasoning_id: self.state.reasoning_id.clone(),
            }));
        }
    }

    fn finalize_pending(&mut self, events: &mut Vec<StreamEvent>) {
        for call in self.state.finalize_all_tool_calls() {
            events.push(self.tool_call_event(call));
        }
        if self.phase == TurnPhase::Streaming {
            self.phase = if self.state.has_tool_calls() {
                TurnPhase::ToolCallsPending
            } else {
                TurnPhase::NaturalFinish
            };
        }
    }

    fn tool_call_event(&self, call: ToolCall) -> StreamEvent {
        StreamEvent::new(EventKind::ToolCall {
            tool_call: call,
            message_id: self.state.message_id.clone(),
        })
    }
}

fn provider_input_event(block: ProviderToolBlock) -> StreamEvent {
    let data = if block.streamed_input.trim().is_empty() {
        block.input
    } else {
        serde_json::from_str(&block.streamed_input)
            .unwrap_or(serde_json::Value::String(block.streamed_input))
    };
    StreamEvent::new(EventKind::ProviderTool {
        tool_type: block.tool_type,
        status: ProviderToolStatus::InputAvailable,
        item_id: block.item_id,
        data,
    })
}

/// Item yielded by [`run`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnItem {
    /// A canonical event.
    Event(StreamEvent),
    /// The turn completed; always the last item.
    Finished(TurnOutcome),
}

/// Stream of turn items borrowing the request state.
pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = Result<TurnItem, TurnError>> + Send + 'a>>;

/// Drive one turn over a response body.
///
/// The body is read to its end (some vendors report usage after the finish
/// signal). Malformed frames and fatal vendor errors end the stream with an
/// error. Dropping the returned stream drops the body.
pub fn run<'a>(decoder: &'a dyn Decoder, body: ByteStream, state: &'a mut StreamState) -> TurnStream<'a> {
    Box::pin(async_stream::stream! {
        let vendor = decoder.vendor();
        let mut frames = wire::frames(body, decoder.framing());
        let mut processor = TurnProcessor::new(state);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(TurnError::Decode(e));
                    return;
                }
            };
            let chunk = match decoder.decode(&frame) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(vendor, error = %e, "turn: decode failed");
                    yield Err(TurnError::Decode(e));
                    return;
                }
            };

            for delta in decoder.deltas(&chunk) {
                for event in processor.apply(delta) {
                    yield Ok(TurnItem::Event(event));
                }
                if let Some(failure) = processor.take_fatal() {
                    yield Err(TurnError::Vendor {
                        vendor,
                        error_type: failure.error_type,
                        message: failure.message,
                    });
                    return;
                }
            }
        }

        let (events, outcome) = processor.finish();
        for event in events {
            yield Ok(TurnItem::Event(event));
        }
        yield Ok(TurnItem::Finished(outcome));
    })
}
