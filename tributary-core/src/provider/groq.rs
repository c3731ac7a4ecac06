//! Groq Chat Completions dialect.

use serde_json::Value;

use super::openai_compat::{
    ChatDialect, OpenAiCompatProvider, standard_finish_reason, standard_tool_calls,
    standard_usage,
};
use crate::decoder::Delta;
use crate::event::FinishReason;
use crate::usage::UsageUpdate;
use crate::wire::Chunk;

/// Groq OpenAI-compatible endpoint.
const API_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// The Groq dialect.
///
/// Reasoning arrives in `delta.reasoning`; usage is attached to the last
/// chunk under `x_groq.usage`, so `stream_options` is not sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Groq;

impl ChatDialect for Groq {
    fn vendor(&self) -> &'static str {
        "groq"
    }

    fn endpoint(&self) -> &'static str {
        API_ENDPOINT
    }

    fn extract_thinking(&self, delta: &Value) -> Option<String> {
        delta
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn extract_tool_calls(&self, delta: &Value) -> Vec<Delta> {
        standard_tool_calls(delta)
    }

    fn extract_usage(&self, chunk: &Chunk) -> Option<UsageUpdate> {
        chunk
            .at("/x_groq/usage")
            .or_else(|| chunk.at("/usage"))
            .and_then(standard_usage)
    }

    fn map_finish_reason(&self, reason: &str) -> FinishReason {
        standard_finish_reason(reason)
    }

    fn include_usage(&self) -> bool {
        false
    }
}

impl OpenAiCompatProvider<Groq> {
    /// Create a Groq provider.
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_dialect(Groq, api_key, model)
    }
}
