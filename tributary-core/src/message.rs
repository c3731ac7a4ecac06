//! Conversation and tool-call data types.
//!
//! Provides the [`Role`] enum and [`Message`] struct that represent
//! conversation messages across all vendors, together with the tool data
//! that flows through the agent loop: [`ToolCall`], [`ToolResult`],
//! [`Artifact`] and the handler return forms [`ToolOutput`] / [`ToolReturn`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions for the model.
    System,
    /// User input.
    User,
    /// Model response.
    Assistant,
    /// Results of locally executed tools.
    Tool,
}

impl Role {
    /// Wire name of the role as used by chat-completions style APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Reasoning text produced by the model during a turn.
///
/// Some vendors (Anthropic) require the opaque `signature` to be echoed back
/// verbatim when the reasoning is replayed in a later request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reasoning {
    /// The reasoning text.
    pub text: String,
    /// Vendor-issued signature for the reasoning block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The role of this message.
    pub role: Role,
    /// The text content of this message.
    pub content: String,
    /// Reasoning emitted alongside an assistant turn.
    pub reasoning: Option<Reasoning>,
    /// Tool calls requested by an assistant turn.
    pub tool_calls: Vec<ToolCall>,
    /// Tool results carried by a [`Role::Tool`] message.
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    /// Create a new message with the given role and content.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::message::{Message, Role};
    ///
    /// let msg = Message::new(Role::User, "Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// assert_eq!(msg.content, "Hello!");
    /// assert!(msg.tool_calls.is_empty());
    /// ```
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Create the assistant message that records one completed turn.
    pub fn assistant_turn(
        content: impl Into<String>,
        reasoning: Option<Reasoning>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            reasoning,
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a tool message carrying the results of one tool batch.
    ///
    /// Vendors disagree on how tool results are shaped on the wire (one
    /// message per result, or one message with several blocks); encoders
    /// expand this message as their protocol requires.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            tool_results: results,
            ..Self::new(Role::Tool, "")
        }
    }
}

/// A tool invocation requested by the model.
///
/// Immutable once constructed. Arguments are always a parsed JSON object;
/// see [`ToolCall::from_fragments`] for the fallback applied to argument
/// text that is not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    id: String,
    name: String,
    arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning_id: Option<String>,
}

impl ToolCall {
    /// Create a tool call from already-parsed arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result_id: None,
            reasoning_id: None,
        }
    }

    /// Create a tool call from accumulated argument text.
    ///
    /// - empty or whitespace-only text parses to an empty map
    /// - a JSON object becomes the argument map
    /// - anything else (invalid JSON, or JSON that is not an object) is kept
    ///   as `{"raw": <text>}` so partial tool-call data is never dropped
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::ToolCall;
    ///
    /// let call = ToolCall::from_fragments("call_1", "echo", r#"{"input":"world"}"#);
    /// assert_eq!(call.arguments()["input"], "world");
    ///
    /// let broken = ToolCall::from_fragments("call_2", "echo", r#"{"input":"wor"#);
    /// assert_eq!(broken.arguments()["raw"], r#"{"input":"wor"#);
    /// ```
    pub fn from_fragments(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        Self::new(id, name, parse_arguments(raw))
    }

    /// Create a tool call from a JSON value delivered whole by the vendor.
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            Value::String(text) => parse_arguments(&text),
            other => raw_arguments(other.to_string()),
        };
        Self::new(id, name, arguments)
    }

    /// Attach the id under which this call's result will be reported.
    #[must_use]
    pub fn with_result_id(mut self, result_id: impl Into<String>) -> Self {
        self.result_id = Some(result_id.into());
        self
    }

    /// Attach the id of the reasoning block that preceded this call.
    #[must_use]
    pub fn with_reasoning_id(mut self, reasoning_id: impl Into<String>) -> Self {
        self.reasoning_id = Some(reasoning_id.into());
        self
    }

    /// Vendor-assigned call id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the tool the model wants to call.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed call arguments.
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Arguments as a JSON object value.
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    /// Id under which the result of this call is reported.
    pub fn result_id(&self) -> Option<&str> {
        self.result_id.as_deref()
    }

    /// Id of the reasoning block that preceded this call.
    pub fn reasoning_id(&self) -> Option<&str> {
        self.reasoning_id.as_deref()
    }
}

fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => raw_arguments(raw.to_string()),
    }
}

fn raw_arguments(raw: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("raw".to_string(), Value::String(raw));
    map
}

/// Result payload of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultValue {
    /// Plain text result (also used for error messages).
    Text(String),
    /// Structured result.
    Json(Value),
}

impl ToolResultValue {
    /// Render the result as the string sent back to the model.
    pub fn to_text(&self) -> String {
        match self {
            ToolResultValue::Text(text) => text.clone(),
            ToolResultValue::Json(value) => value.to_string(),
        }
    }
}

/// The outcome of one executed tool call.
///
/// Produced exactly once per executed (non-deferred) call, for both
/// successful and failed invocations. Failures carry a human-readable
/// message as `result` and set `is_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Id of the call this result answers.
    pub tool_call_id: String,
    /// Name of the tool as requested by the model.
    pub tool_name: String,
    /// Arguments the tool was called with.
    pub args: Map<String, Value>,
    /// Result payload, or the error message on failure.
    pub result: ToolResultValue,
    /// Id under which this result is reported to consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_result_id: Option<String>,
    /// Binary artifacts produced alongside the result.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Whether the invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Build a successful result for `call`.
    pub fn success(call: &ToolCall, result: ToolResultValue, artifacts: Vec<Artifact>) -> Self {
        Self {
            tool_call_id: call.id().to_string(),
            tool_name: call.name().to_string(),
            args: call.arguments().clone(),
            result,
            tool_call_result_id: call.result_id().map(str::to_string),
            artifacts,
            is_error: false,
        }
    }

    /// Build a failed result for `call` carrying `message`.
    pub fn failure(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id().to_string(),
            tool_name: call.name().to_string(),
            args: call.arguments().clone(),
            result: ToolResultValue::Text(message.into()),
            tool_call_result_id: call.result_id().map(str::to_string),
            artifacts: Vec::new(),
            is_error: true,
        }
    }
}

/// A binary payload produced by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Base64-encoded payload.
    pub data: String,
    /// MIME type of the decoded payload.
    pub mime_type: String,
    /// Free-form metadata supplied by the tool.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Unique artifact id.
    pub id: String,
}

impl Artifact {
    /// Create an artifact from an already base64-encoded payload.
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            metadata: Map::new(),
            id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Create an artifact by base64-encoding raw bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::Artifact;
    ///
    /// let artifact = Artifact::from_bytes(b"hello", "text/plain");
    /// assert_eq!(artifact.data, "aGVsbG8=");
    /// assert_eq!(artifact.bytes().unwrap(), b"hello");
    /// ```
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(BASE64.encode(bytes), mime_type)
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Decode the payload into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`base64::DecodeError`] if `data` is not valid base64.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.data.as_bytes())
    }
}

/// Composite return value of a tool handler: a result plus artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Result text sent back to the model.
    pub result: String,
    /// Artifacts reported to the consumer, in order.
    pub artifacts: Vec<Artifact>,
}

impl ToolOutput {
    /// Create an output with a result and no artifacts.
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            artifacts: Vec::new(),
        }
    }

    /// Append an artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Everything a tool handler may return.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReturn {
    /// A bare string result.
    Text(String),
    /// A structured result.
    Json(Value),
    /// A result with artifacts.
    Output(ToolOutput),
}

impl ToolReturn {
    /// Split into the result payload and its artifacts.
    pub fn into_parts(self) -> (ToolResultValue, Vec<Artifact>) {
        match self {
            ToolReturn::Text(text) => (ToolResultValue::Text(text), Vec::new()),
            ToolReturn::Json(value) => (ToolResultValue::Json(value), Vec::new()),
            ToolReturn::Output(output) => (ToolResultValue::Text(output.result), output.artifacts),
        }
    }
}

impl From<String> for ToolReturn {
    fn from(value: String) -> Self {
        ToolReturn::Text(value)
    }
}

impl From<&str> for ToolReturn {
    fn from(value: &str) -> Self {
        ToolReturn::Text(value.to_string())
    }
}

impl From<Value> for ToolReturn {
    fn from(value: Value) -> Self {
        ToolReturn::Json(value)
    }
}

impl From<ToolOutput> for ToolReturn {
    fn from(value: ToolOutput) -> Self {
        ToolReturn::Output(value)
    }
}
