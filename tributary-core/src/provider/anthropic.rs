//! Anthropic Messages API provider.
//!
//! Encodes conversations for the Messages API and decodes its SSE stream
//! with [`AnthropicDecoder`].

mod stream;
mod types;

#[cfg(test)]
mod tests;

pub use stream::AnthropicDecoder;

use super::{GenerateOptions, Provider, ProviderError, to_body};
use crate::decoder::Decoder;
use crate::message::{Message, Role};
use crate::tool::Tool;
use crate::transport::HttpRequest;
use types::{AnthropicTool, ApiMessage, ApiRequest, ContentBlock, ThinkingConfig};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API endpoint.
const API_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic Claude provider.
///
/// # Examples
///
/// ```
/// use tributary_core::message::{Message, Role};
/// use tributary_core::provider::{AnthropicProvider, GenerateOptions, Provider};
///
/// let provider = AnthropicProvider::new("sk-ant-...", "claude-sonnet-4-5");
/// let messages = vec![
///     Message::new(Role::System, "Be brief."),
///     Message::new(Role::User, "Hello, Claude!"),
/// ];
/// let request = provider
///     .build_request(&messages, &[], &GenerateOptions::default())
///     .unwrap();
/// assert_eq!(request.body["system"], "Be brief.");
/// assert_eq!(request.header_value("anthropic-version"), Some("2023-06-01"));
/// ```
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    endpoint: String,
    /// Anthropic API key.
    api_key: String,
    /// Model identifier (e.g., "claude-sonnet-4-5").
    model: String,
    decoder: AnthropicDecoder,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model identifier (e.g., "claude-sonnet-4-5")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: API_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            decoder: AnthropicDecoder,
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

/// Extract system prompt from messages.
fn extract_system(messages: &[Message]) -> Option<String> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    (!system.is_empty()).then(|| system.join("\n\n"))
}

/// Build API messages from conversation messages.
///
/// Tool results travel as `tool_result` blocks in a user message. Reasoning
/// is replayed only when it carries a signature, since the API rejects
/// unsigned thinking blocks.
fn build_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut api_messages = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System => {}
            Role::User => api_messages.push(ApiMessage {
                role: "user",
                content: vec![ContentBlock::Text {
                    text: m.content.clone(),
                }],
            }),
            Role::Assistant => {
                let mut content = Vec::new();
                if let Some(reasoning) = &m.reasoning
                    && let Some(signature) = &reasoning.signature
                {
                    content.push(ContentBlock::Thinking {
                        thinking: reasoning.text.clone(),
                        signature: signature.clone(),
                    });
                }
                if !m.content.is_empty() {
                    content.push(ContentBlock::Text {
                        text: m.content.clone(),
                    });
                }
                content.extend(m.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id().to_string(),
                    name: call.name().to_string(),
                    input: call.arguments_value(),
                }));
                if !content.is_empty() {
                    api_messages.push(ApiMessage {
                        role: "assistant",
                        content,
                    });
                }
            }
            Role::Tool => api_messages.push(ApiMessage {
                role: "user",
                content: m
                    .tool_results
                    .iter()
                    .map(|result| ContentBlock::ToolResult {
                        tool_use_id: result.tool_call_id.clone(),
                        content: result.result.to_text(),
                        is_error: result.is_error,
                    })
                    .collect(),
            }),
        }
    }
    api_messages
}

fn to_anthropic_tools(tools: &[Tool]) -> Option<Vec<AnthropicTool>> {
    (!tools.is_empty()).then(|| {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    })
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let thinking = options.thinking_budget.map(|budget_tokens| ThinkingConfig {
            config_type: "enabled",
            budget_tokens,
        });
        // The output limit must exceed the thinking budget.
        let max_tokens = match &thinking {
            Some(t) => options.max_tokens.max(t.budget_tokens + 1),
            None => options.max_tokens,
        };

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens,
            messages: build_api_messages(messages),
            system: extract_system(messages),
            tools: to_anthropic_tools(tools),
            // Temperature is rejected while extended thinking is enabled.
            temperature: options.temperature.filter(|_| thinking.is_none()),
            thinking,
            stream: true,
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            thinking = request.thinking.is_some(),
            "anthropic: building request"
        );
        Ok(HttpRequest::new(&self.endpoint, to_body(&request)?)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn decoder(&self) -> &dyn Decoder {
        &self.decoder
    }
}
