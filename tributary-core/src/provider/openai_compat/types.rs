//! Serde request structs for OpenAI-compatible Chat Completions APIs.
//!
//! Responses are read through [`Chunk`](crate::wire::Chunk) key paths
//! instead of typed structs, because every dialect adds its own fields.

use serde::Serialize;

/// A single message in the API request body.
#[derive(Debug, Serialize)]
pub(super) struct ApiMessage {
    /// Message role ("system", "user", "assistant", or "tool").
    pub(super) role: String,
    /// Message content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) content: Option<String>,
    /// Tool calls (present in assistant messages with tool use).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_calls: Option<Vec<OaiToolCall>>,
    /// Tool call ID (present in tool result messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_call_id: Option<String>,
}

/// Request body for a streaming Chat Completions API call.
#[derive(Debug, Serialize)]
pub(super) struct StreamingApiRequest {
    /// Model identifier.
    pub(super) model: String,
    /// Conversation messages.
    pub(super) messages: Vec<ApiMessage>,
    /// Maximum tokens to generate.
    pub(super) max_tokens: u32,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f32>,
    /// Must be `true` for streaming calls.
    pub(super) stream: bool,
    /// Ask for a final usage chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) stream_options: Option<StreamOptions>,
    /// Optional tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tools: Option<Vec<OaiTool>>,
    /// Tool choice strategy. Omitted when no tools are offered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_choice: Option<String>,
}

/// Streaming options.
#[derive(Debug, Serialize)]
pub(super) struct StreamOptions {
    pub(super) include_usage: bool,
}

/// Tool definition in OpenAI-compatible format.
#[derive(Debug, Serialize)]
pub(super) struct OaiTool {
    #[serde(rename = "type")]
    pub(super) tool_type: String,
    pub(super) function: OaiFunction,
}

/// Function definition within a tool.
#[derive(Debug, Serialize)]
pub(super) struct OaiFunction {
    pub(super) name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(super) description: String,
    pub(super) parameters: serde_json::Value,
}

/// Tool call echoed back in an assistant history message.
#[derive(Debug, Serialize)]
pub(super) struct OaiToolCall {
    pub(super) id: String,
    #[serde(rename = "type")]
    pub(super) call_type: String,
    pub(super) function: OaiToolCallFunction,
}

/// Function name + JSON-encoded arguments within a tool call.
#[derive(Debug, Serialize)]
pub(super) struct OaiToolCallFunction {
    pub(super) name: String,
    pub(super) arguments: String,
}
