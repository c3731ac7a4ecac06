//! MCP configuration and result conversion.
//!
//! The configuration file uses the `mcpServers` layout shared by most MCP
//! hosts. Tool results returned by a server are converted into the crate's
//! [`ToolReturn`] here.

use std::collections::HashMap;

use rmcp::model::{CallToolResult, RawContent};
use serde::{Deserialize, Serialize};

use crate::message::{Artifact, ToolOutput, ToolReturn};
use crate::tool::ToolError;

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to execute to start the server.
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Top-level MCP configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Map of server names to their configurations.
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

/// Convert a server's tool result.
///
/// Text blocks are joined with newlines into the result text and image
/// blocks become artifacts. Other content kinds are skipped. When the server
/// sent no text but did send structured content, that becomes a JSON result.
///
/// # Errors
///
/// A result flagged `is_error` becomes [`ToolError::Failed`] carrying the
/// joined text, so the model sees the failure.
pub(crate) fn convert_result(result: CallToolResult) -> Result<ToolReturn, ToolError> {
    let mut texts = Vec::new();
    let mut artifacts = Vec::new();
    for content in result.content {
        match content.raw {
            RawContent::Text(text) => texts.push(text.text),
            RawContent::Image(image) => artifacts.push(Artifact::new(image.data, image.mime_type)),
            _ => {}
        }
    }
    let text = texts.join("\n");

    if result.is_error.unwrap_or(false) {
        return Err(ToolError::Failed(if text.is_empty() {
            "MCP tool reported an error".to_string()
        } else {
            text
        }));
    }

    if text.is_empty()
        && artifacts.is_empty()
        && let Some(structured) = result.structured_content
    {
        return Ok(ToolReturn::Json(structured));
    }

    let output = artifacts
        .into_iter()
        .fold(ToolOutput::new(text), ToolOutput::with_artifact);
    Ok(ToolReturn::Output(output))
}
