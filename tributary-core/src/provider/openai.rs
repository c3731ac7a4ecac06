//! OpenAI Chat Completions dialect.

use serde_json::Value;

use super::openai_compat::{
    ChatDialect, OpenAiCompatProvider, standard_finish_reason, standard_tool_calls,
    standard_usage,
};
use crate::decoder::Delta;
use crate::event::FinishReason;
use crate::usage::UsageUpdate;
use crate::wire::Chunk;

/// OpenAI Chat Completions API endpoint.
const API_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// The plain OpenAI dialect.
///
/// Reports cached prompt tokens and reasoning tokens from the final usage
/// chunk. Chat Completions does not stream reasoning text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAi;

impl ChatDialect for OpenAi {
    fn vendor(&self) -> &'static str {
        "openai"
    }

    fn endpoint(&self) -> &'static str {
        API_ENDPOINT
    }

    fn extract_thinking(&self, _delta: &Value) -> Option<String> {
        None
    }

    fn extract_tool_calls(&self, delta: &Value) -> Vec<Delta> {
        standard_tool_calls(delta)
    }

    fn extract_usage(&self, chunk: &Chunk) -> Option<UsageUpdate> {
        chunk.at("/usage").and_then(standard_usage)
    }

    fn map_finish_reason(&self, reason: &str) -> FinishReason {
        standard_finish_reason(reason)
    }
}

impl OpenAiCompatProvider<OpenAi> {
    /// Create an OpenAI provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::provider::{OpenAiCompatProvider, Provider};
    ///
    /// let provider = OpenAiCompatProvider::openai("sk-...", "gpt-4o");
    /// assert_eq!(provider.name(), "openai");
    /// assert_eq!(provider.model(), "gpt-4o");
    /// ```
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_dialect(OpenAi, api_key, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_with_details() {
        let chunk = Chunk::new(json!({
            "choices": [],
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 20,
                "prompt_tokens_details": {"cached_tokens": 64},
                "completion_tokens_details": {"reasoning_tokens": 12}
            }
        }));
        let usage = OpenAi.extract_usage(&chunk).unwrap();
        assert_eq!(usage.prompt_tokens, Some(100));
        assert_eq!(usage.completion_tokens, Some(20));
        assert_eq!(usage.cache_read_input_tokens, Some(64));
        assert_eq!(usage.thought_tokens, Some(12));
    }

    #[test]
    fn test_null_usage_is_ignored() {
        let chunk = Chunk::new(json!({"choices": [], "usage": null}));
        assert!(OpenAi.extract_usage(&chunk).is_none());
    }

    #[test]
    fn test_finish_reasons() {
        assert_eq!(OpenAi.map_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(OpenAi.map_finish_reason("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(OpenAi.map_finish_reason("content_filter"), FinishReason::ContentFilter);
        assert_eq!(
            OpenAi.map_finish_reason("something_new"),
            FinishReason::Other("something_new".to_string())
        );
    }

    #[test]
    fn test_no_streamed_thinking() {
        assert!(OpenAi.extract_thinking(&json!({"content": "x"})).is_none());
    }
}
