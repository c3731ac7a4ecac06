//! Serde request structs for the Anthropic Messages API.
//!
//! Only requests are typed; streamed responses are read through
//! [`Chunk`](crate::wire::Chunk) key paths by
//! [`AnthropicDecoder`](super::AnthropicDecoder).

use serde::Serialize;

/// Request body for Anthropic Messages API.
#[derive(Debug, Serialize)]
pub(super) struct ApiRequest {
    /// Model identifier.
    pub(super) model: String,
    /// Maximum tokens to generate.
    pub(super) max_tokens: u32,
    /// Conversation messages (user/assistant only).
    pub(super) messages: Vec<ApiMessage>,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) system: Option<String>,
    /// Optional tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tools: Option<Vec<AnthropicTool>>,
    /// Sampling temperature (not allowed together with thinking).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f32>,
    /// Extended thinking configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) thinking: Option<ThinkingConfig>,
    /// Must be `true` for streaming calls.
    pub(super) stream: bool,
}

/// Extended thinking configuration.
#[derive(Debug, Serialize)]
pub(super) struct ThinkingConfig {
    /// Always `"enabled"`.
    #[serde(rename = "type")]
    pub(super) config_type: &'static str,
    /// Token budget for thinking.
    pub(super) budget_tokens: u32,
}

/// Tool definition in Anthropic API format.
#[derive(Debug, Serialize)]
pub(super) struct AnthropicTool {
    /// Tool name.
    pub(super) name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(super) description: String,
    /// JSON Schema for the tool's input parameters.
    pub(super) input_schema: serde_json::Value,
}

/// A single message in the API request.
#[derive(Debug, Serialize)]
pub(super) struct ApiMessage {
    /// Message role ("user" or "assistant").
    pub(super) role: &'static str,
    /// Message content blocks.
    pub(super) content: Vec<ContentBlock>,
}

/// A content block in a request message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// Replayed reasoning; the signature must match what the API issued.
    Thinking { thinking: String, signature: String },
    /// A tool call made by the assistant.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The result of a tool call.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}
