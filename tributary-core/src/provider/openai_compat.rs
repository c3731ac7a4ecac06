//! Shared decoder and request encoding for OpenAI-compatible Chat
//! Completions APIs.
//!
//! OpenAI, DeepSeek and Groq speak the same SSE wire format with small
//! differences in where reasoning, usage and finish reasons live. Those
//! differences are the [`ChatDialect`] hooks; everything else is shared by
//! [`ChatCompletionsDecoder`] and [`OpenAiCompatProvider`].

mod types;


use serde_json::Value;

use super::{GenerateOptions, Provider, ProviderError, to_body};
use crate::decoder::{Decoder, Delta, decode_sse_json};
use crate::event::{Citation, FinishReason};
use crate::message::{Message, Role};
use crate::tool::Tool;
use crate::transport::HttpRequest;
use crate::usage::UsageUpdate;
use crate::wire::{Chunk, DecodeError, Frame, Framing};
use types::{
    ApiMessage, OaiFunction, OaiTool, OaiToolCall, OaiToolCallFunction, StreamOptions,
    StreamingApiRequest,
};

/// Error codes that abort the turn.
const FATAL_ERROR_CODES: &[&str] = &[
    "rate_limit_exceeded",
    "insufficient_quota",
    "invalid_api_key",
    "authentication_error",
];

/// Vendor-specific extraction hooks for the Chat Completions format.
///
/// The `standard_*` functions in this module implement the plain OpenAI
/// shapes; dialects call them and add their own fields.
pub trait ChatDialect: Send + Sync {
    /// Vendor tag.
    fn vendor(&self) -> &'static str;

    /// Default endpoint URL.
    fn endpoint(&self) -> &'static str;

    /// Reasoning text carried by a `choices[0].delta` object.
    fn extract_thinking(&self, delta: &Value) -> Option<String>;

    /// Tool-call deltas carried by a `choices[0].delta` object.
    fn extract_tool_calls(&self, delta: &Value) -> Vec<Delta>;

    /// Usage counters carried by a chunk.
    fn extract_usage(&self, chunk: &Chunk) -> Option<UsageUpdate>;

    /// Map a vendor finish reason.
    fn map_finish_reason(&self, reason: &str) -> FinishReason;

    /// Whether to request a trailing usage chunk via `stream_options`.
    fn include_usage(&self) -> bool {
        true
    }
}

/// Tool-call deltas in the standard `delta.tool_calls[]` shape.
///
/// An entry carrying a function name introduces a call; its `arguments`
/// (possibly empty) and those of later entries with the same `index` are
/// fragments.
pub fn standard_tool_calls(delta: &Value) -> Vec<Delta> {
    let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut deltas = Vec::new();
    for (position, call) in calls.iter().enumerate() {
        let index = call
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |i| i as usize);
        let function = call.get("function");
        let name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty());
        let id = call.get("id").and_then(Value::as_str).map(str::to_string);

        if let Some(name) = name {
            deltas.push(Delta::ToolCallStart {
                index,
                id,
                name: name.to_string(),
            });
        }

        match function.and_then(|f| f.get("arguments")) {
            Some(Value::String(fragment)) if !fragment.is_empty() => {
                deltas.push(Delta::ToolCallArgs {
                    index,
                    fragment: fragment.clone(),
                });
            }
            Some(object @ Value::Object(_)) => {
                deltas.push(Delta::ToolCallArgs {
                    index,
                    fragment: object.to_string(),
                });
            }
            _ => {}
        }
    }
    deltas
}

/// Usage counters in the standard top-level `usage` object.
pub fn standard_usage(usage: &Value) -> Option<UsageUpdate> {
    let counter = |path: &str| usage.pointer(path).and_then(Value::as_u64);
    let update = UsageUpdate {
        prompt_tokens: counter("/prompt_tokens"),
        completion_tokens: counter("/completion_tokens"),
        cache_write_input_tokens: None,
        cache_read_input_tokens: counter("/prompt_tokens_details/cached_tokens"),
        thought_tokens: counter("/completion_tokens_details/reasoning_tokens"),
    };
    (!update.is_empty()).then_some(update)
}

/// Finish reasons shared by every Chat Completions vendor.
pub fn standard_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Decoder for Chat Completions SSE streams.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletionsDecoder<D> {
    dialect: D,
}

impl<D: ChatDialect> ChatCompletionsDecoder<D> {
    /// Create a decoder for `dialect`.
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    /// The dialect hooks.
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    fn vendor_error(&self, error: &Value) -> Delta {
        let code = error.get("code").and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let error_type = error
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| code.clone())
            .unwrap_or_else(|| "error".to_string());
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let fatal = [Some(error_type.as_str()), code.as_deref()]
            .into_iter()
            .flatten()
            .any(|c| FATAL_ERROR_CODES.contains(&c) || c == "429");

        Delta::VendorError {
            error_type,
            message,
            fatal,
        }
    }
}

impl<D: ChatDialect> Decoder for ChatCompletionsDecoder<D> {
    fn vendor(&self) -> &'static str {
        self.dialect.vendor()
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn decode(&self, frame: &Frame) -> Result<Option<Chunk>, DecodeError> {
        decode_sse_json(self.vendor(), frame)
    }

    fn deltas(&self, chunk: &Chunk) -> Vec<Delta> {
        if let Some(error) = chunk.at("/error") {
            return vec![self.vendor_error(error)];
        }

        let mut deltas = Vec::new();
        if let Some(delta) = chunk.at("/choices/0/delta") {
            if delta.get("role").is_some() {
                deltas.push(Delta::MessageStart {
                    id: chunk.str_at("/id").map(str::to_string),
                    model: chunk.str_at("/model").map(str::to_string),
                });
            }
            if let Some(thinking) = self.dialect.extract_thinking(delta) {
                deltas.push(Delta::Thinking(thinking));
            }
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                deltas.push(Delta::Text(text.to_string()));
            }
            deltas.extend(self.dialect.extract_tool_calls(delta));
            deltas.extend(url_citations(delta));
        }

        if let Some(usage) = self.dialect.extract_usage(chunk) {
            deltas.push(Delta::Usage(usage));
        }

        if let Some(reason) = chunk.str_at("/choices/0/finish_reason") {
            deltas.push(Delta::Finish(self.dialect.map_finish_reason(reason)));
        }

        deltas
    }
}

/// `url_citation` annotations attached to a delta.
fn url_citations(delta: &Value) -> Vec<Delta> {
    let Some(annotations) = delta.get("annotations").and_then(Value::as_array) else {
        return Vec::new();
    };
    annotations
        .iter()
        .filter(|a| a.get("type").and_then(Value::as_str) == Some("url_citation"))
        .map(|annotation| {
            let body = annotation.get("url_citation").unwrap_or(annotation);
            let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
            Delta::Citation {
                citation: Citation {
                    citation_type: "url_citation".to_string(),
                    cited_text: None,
                    url: field("url"),
                    title: field("title"),
                    raw: annotation.clone(),
                },
                block_index: 0,
            }
        })
        .collect()
}

/// Convert a slice of [`Message`]s to the OpenAI-compatible wire format.
///
/// A tool message expands into one `tool` message per result.
fn build_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut api_messages = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::Tool => {
                api_messages.extend(m.tool_results.iter().map(|result| ApiMessage {
                    role: Role::Tool.as_str().to_string(),
                    content: Some(result.result.to_text()),
                    tool_calls: None,
                    tool_call_id: Some(result.tool_call_id.clone()),
                }));
            }
            Role::Assistant if !m.tool_calls.is_empty() => {
                let tool_calls = m
                    .tool_calls
                    .iter()
                    .map(|tc| OaiToolCall {
                        id: tc.id().to_string(),
                        call_type: "function".to_string(),
                        function: OaiToolCallFunction {
                            name: tc.name().to_string(),
                            arguments: tc.arguments_value().to_string(),
                        },
                    })
                    .collect();
                api_messages.push(ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: (!m.content.is_empty()).then(|| m.content.clone()),
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                });
            }
            _ => api_messages.push(ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            }),
        }
    }
    api_messages
}

/// Convert tools to the OpenAI-compatible tool format.
///
/// Returns `None` when the input slice is empty so that `tools` can be omitted
/// from the serialized request body.
fn to_oai_tools(tools: &[Tool]) -> Option<Vec<OaiTool>> {
    if tools.is_empty() {
        None
    } else {
        Some(
            tools
                .iter()
                .map(|t| OaiTool {
                    tool_type: "function".to_string(),
                    function: OaiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        )
    }
}

/// Provider for OpenAI-compatible Chat Completions APIs.
///
/// Holds the endpoint, API key and model; the dialect supplies the
/// vendor-specific decoding hooks.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider<D> {
    endpoint: String,
    api_key: String,
    model: String,
    decoder: ChatCompletionsDecoder<D>,
}

impl<D: ChatDialect> OpenAiCompatProvider<D> {
    /// Create a provider for `dialect` at its default endpoint.
    pub fn with_dialect(dialect: D, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: dialect.endpoint().to_string(),
            api_key: api_key.into(),
            model: model.into(),
            decoder: ChatCompletionsDecoder::new(dialect),
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

impl<D: ChatDialect + 'static> Provider for OpenAiCompatProvider<D> {
    fn name(&self) -> &'static str {
        self.decoder.dialect().vendor()
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
        let request = StreamingApiRequest {
            model: self.model.clone(),
            messages: build_api_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: true,
            stream_options: self
                .decoder
                .dialect()
                .include_usage()
                .then_some(StreamOptions {
                    include_usage: true,
                }),
            tools: to_oai_tools(tools),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
        };

        tracing::debug!(
            vendor = self.name(),
            model = %self.model,
            messages = request.messages.len(),
            "openai_compat: building request"
        );
        Ok(HttpRequest::new(&self.endpoint, to_body(&request)?)
            .header("Authorization", format!("Bearer {}", self.api_key)))
    }

    fn decoder(&self) -> &dyn Decoder {
        &self.decoder
    }
}
