//! DeepSeek Chat Completions dialect.

use serde_json::Value;

use super::openai_compat::{
    ChatDialect, OpenAiCompatProvider, standard_finish_reason, standard_tool_calls,
    standard_usage,
};
use crate::decoder::Delta;
use crate::event::FinishReason;
use crate::usage::UsageUpdate;
use crate::wire::Chunk;

/// DeepSeek Chat Completions API endpoint.
const API_ENDPOINT: &str = "https://api.deepseek.com/chat/completions";

/// The DeepSeek dialect.
///
/// Reasoning models stream their chain of thought in
/// `delta.reasoning_content`; prompt cache hits are reported as
/// `prompt_cache_hit_tokens`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepSeek;

impl ChatDialect for DeepSeek {
    fn vendor(&self) -> &'static str {
        "deepseek"
    }

    fn endpoint(&self) -> &'static str {
        API_ENDPOINT
    }

    fn extract_thinking(&self, delta: &Value) -> Option<String> {
        delta
            .get("reasoning_content")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn extract_tool_calls(&self, delta: &Value) -> Vec<Delta> {
        standard_tool_calls(delta)
    }

    fn extract_usage(&self, chunk: &Chunk) -> Option<UsageUpdate> {
        let usage = chunk.at("/usage")?;
        let mut update = standard_usage(usage)?;
        if let Some(hits) = usage.get("prompt_cache_hit_tokens").and_then(Value::as_u64) {
            update.cache_read_input_tokens = Some(hits);
        }
        Some(update)
    }

    fn map_finish_reason(&self, reason: &str) -> FinishReason {
        match reason {
            "insufficient_system_resource" => FinishReason::Error,
            other => standard_finish_reason(other),
        }
    }
}

impl OpenAiCompatProvider<DeepSeek> {
    /// Create a DeepSeek provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::provider::{OpenAiCompatProvider, Provider};
    ///
    /// let provider = OpenAiCompatProvider::deepseek("sk-...", "deepseek-reasoner");
    /// assert_eq!(provider.name(), "deepseek");
    /// ```
    pub fn deepseek(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_dialect(DeepSeek, api_key, model)
    }
}
