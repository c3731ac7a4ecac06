//! Ollama `/api/chat` provider.
//!
//! Ollama streams one JSON object per line. Tool calls arrive whole, with
//! parsed argument objects, and the last line carries `done: true` together
//! with the token counters.

use serde::Serialize;
use serde_json::Value;

use super::{GenerateOptions, Provider, ProviderError, to_body};
use crate::decoder::{Decoder, Delta};
use crate::event::FinishReason;
use crate::message::{Message, Role};
use crate::tool::Tool;
use crate::transport::HttpRequest;
use crate::usage::UsageUpdate;
use crate::wire::{Chunk, DecodeError, Frame, Framing};

/// Default local Ollama chat endpoint.
const API_ENDPOINT: &str = "http://localhost:11434/api/chat";

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decoder for Ollama JSON-lines streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaDecoder;

impl Decoder for OllamaDecoder {
    fn vendor(&self) -> &'static str {
        "ollama"
    }

    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn decode(&self, frame: &Frame) -> Result<Option<Chunk>, DecodeError> {
        if frame.is_blank() {
            return Ok(None);
        }
        Chunk::parse(self.vendor(), frame).map(Some)
    }

    fn deltas(&self, chunk: &Chunk) -> Vec<Delta> {
        if let Some(error) = chunk.at("/error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            // Ollama closes the stream after an error line.
            return vec![Delta::VendorError {
                error_type: "ollama_error".to_string(),
                message,
                fatal: true,
            }];
        }

        let mut deltas = Vec::new();
        if let Some(thinking) = chunk.str_at("/message/thinking") {
            deltas.push(Delta::Thinking(thinking.to_string()));
        }
        if let Some(content) = chunk.str_at("/message/content") {
            deltas.push(Delta::Text(content.to_string()));
        }
        if let Some(calls) = chunk.at("/message/tool_calls").and_then(Value::as_array) {
            deltas.extend(calls.iter().filter_map(whole_tool_call));
        }

        if chunk.bool_at("/done") == Some(true) {
            let usage = UsageUpdate {
                prompt_tokens: chunk.u64_at("/prompt_eval_count"),
                completion_tokens: chunk.u64_at("/eval_count"),
                ..UsageUpdate::default()
            };
            if !usage.is_empty() {
                deltas.push(Delta::Usage(usage));
            }
            match chunk.str_at("/done_reason") {
                Some(reason) => deltas.push(Delta::Finish(map_done_reason(reason))),
                None => deltas.push(Delta::TurnDone),
            }
        }
        deltas
    }
}

fn whole_tool_call(call: &Value) -> Option<Delta> {
    let function = call.get("function")?;
    let name = function.get("name").and_then(Value::as_str)?;
    let arguments = match function.get("arguments") {
        // Some models send the object as a JSON string.
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::String(raw.clone())),
        Some(value) => value.clone(),
        None => Value::Object(Default::default()),
    };
    Some(Delta::ToolCall {
        id: call.get("id").and_then(Value::as_str).map(str::to_string),
        name: name.to_string(),
        arguments,
    })
}

fn map_done_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        other => FinishReason::Other(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    options: ModelOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ApiMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            thinking: None,
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

fn build_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut api_messages = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::Tool => {
                api_messages.extend(m.tool_results.iter().map(|result| ApiMessage {
                    tool_name: Some(result.tool_name.clone()),
                    ..ApiMessage::new("tool", result.result.to_text())
                }));
            }
            Role::Assistant => api_messages.push(ApiMessage {
                thinking: m.reasoning.as_ref().map(|r| r.text.clone()),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|call| ApiToolCall {
                        function: ApiFunctionCall {
                            name: call.name().to_string(),
                            arguments: call.arguments_value(),
                        },
                    })
                    .collect(),
                ..ApiMessage::new("assistant", m.content.clone())
            }),
            role => api_messages.push(ApiMessage::new(role.as_str(), m.content.clone())),
        }
    }
    api_messages
}

/// Provider for a local or remote Ollama server.
///
/// # Examples
///
/// ```
/// use tributary_core::provider::{OllamaProvider, Provider};
/// use tributary_core::wire::Framing;
///
/// let provider = OllamaProvider::new("qwen3");
/// assert_eq!(provider.endpoint(), "http://localhost:11434/api/chat");
/// assert_eq!(provider.decoder().framing(), Framing::JsonLines);
/// ```
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    decoder: OllamaDecoder,
}

impl OllamaProvider {
    /// Create a provider for `model` on the default local server.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            endpoint: API_ENDPOINT.to_string(),
            model: model.into(),
            decoder: OllamaDecoder,
        }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The endpoint URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: &GenerateOptions,
    ) -> Result<HttpRequest, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_api_messages(messages),
            stream: true,
            tools: (!tools.is_empty()).then(|| {
                tools
                    .iter()
                    .map(|t| ApiTool {
                        tool_type: "function",
                        function: ApiFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            options: ModelOptions {
                num_predict: options.max_tokens,
                temperature: options.temperature,
            },
            think: options.thinking_budget.map(|_| true),
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "ollama: building request"
        );
        Ok(HttpRequest::new(&self.endpoint, to_body(&request)?))
    }

    fn decoder(&self) -> &dyn Decoder {
        &self.decoder
    }
}
