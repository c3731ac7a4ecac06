//! Vendor request encoding.
//!
//! A [`Provider`] knows how to encode a conversation into a vendor HTTP
//! request and which [`Decoder`] reads the vendor's streaming response.
//! Sending the request is the [`Transport`](crate::transport::Transport)'s job.

mod anthropic;
mod deepseek;
mod factory;
mod groq;
mod ollama;
mod openai;
mod openai_compat;

pub use anthropic::{AnthropicDecoder, AnthropicProvider};
pub use deepseek::DeepSeek;
pub use factory::create_provider;
pub use groq::Groq;
pub use ollama::{OllamaDecoder, OllamaProvider};
pub use openai::OpenAi;
pub use openai_compat::{
    ChatCompletionsDecoder, ChatDialect, OpenAiCompatProvider, standard_finish_reason,
    standard_tool_calls, standard_usage,
};

use crate::decoder::Decoder;
use crate::message::Message;
use crate::tool::Tool;
use crate::transport::HttpRequest;

/// Default output token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Error type for provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The vendor rejected the request with HTTP 429.
    #[error("rate limited{}", retry_hint(*retry_after))]
    RateLimited {
        /// Seconds to wait before retrying, from the `retry-after` header.
        retry_after: Option<u64>,
    },

    /// Authentication failed (e.g., invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    /// The vendor returned a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body prefix.
        body: String,
    },

    /// The request could not be encoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// API key not found in environment or config.
    #[error("missing API key: {0}")]
    MissingApiKey(String),

    /// Unknown provider name in configuration.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

fn retry_hint(retry_after: Option<u64>) -> String {
    retry_after
        .map(|secs| format!(" (retry after {}s)", secs))
        .unwrap_or_default()
}

impl ProviderError {
    /// Classify a non-success response.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::provider::ProviderError;
    ///
    /// let err = ProviderError::from_status(429, Some("7"), String::new());
    /// assert_eq!(err, ProviderError::RateLimited { retry_after: Some(7) });
    ///
    /// let err = ProviderError::from_status(500, None, "boom".to_string());
    /// assert_eq!(err.to_string(), "HTTP 500: boom");
    /// ```
    pub fn from_status(status: u16, retry_after: Option<&str>, body: String) -> Self {
        match status {
            429 => ProviderError::RateLimited {
                retry_after: retry_after.and_then(|v| v.trim().parse().ok()),
            },
            401 | 403 => ProviderError::AuthenticationError(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            }),
            _ => ProviderError::Http { status, body },
        }
    }
}

/// Generation settings applied to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Output token limit.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Token budget for extended thinking, where the vendor supports it.
    pub thinking_budget: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            thinking_budget: None,
        }
    }
}

/// Encodes requests for one vendor.
///
/// Implementations must be thread-safe (`Send + Sync`) for use
/// in async contexts.
///
/// # Examples
///
/// ```
/// use tributary_core::message::{Message, Role};
/// use tributary_core::provider::{GenerateOptions, OpenAiCompatProvider, Provider};
///
/// let provider = OpenAiCompatProvider::openai("sk-test", "gpt-4o-mini");
/// let request = provider
///     .build_request(&[Message::new(Role::User, "Hi")], &[], &GenerateOptions::default())
///     .unwrap();
/// assert_eq!(request.body["model"], "gpt-4o-mini");
/// assert_eq!(request.body["stream"], true);
/// assert_eq!(provider.decoder().vendor(), "openai");
/// ```
pub trait Provider: Send + Sync {
    /// Vendor name.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Encode a streaming request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] if the conversation cannot
    /// be encoded for this vendor.
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: &GenerateOptions,
    ) -> Result<HttpRequest, ProviderError>;

    /// The decoder for this vendor's response stream.
    fn decoder(&self) -> &dyn Decoder;
}

/// Serialize a request body.
pub(crate) fn to_body<T: serde::Serialize>(body: &T) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(body).map_err(|e| ProviderError::InvalidRequest(e.to_string()))
}
