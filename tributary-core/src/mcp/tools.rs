//! MCP client and tool adapters.
//!
//! Provides [`McpClient`], which spawns configured servers, discovers their
//! tools and exposes each one as a [`Tool`] whose handler calls the server.

use std::borrow::Cow;
use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParams;
use rmcp::service::{Peer, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;

use super::McpError;
use super::protocol::{McpConfig, McpServerConfig, convert_result};
use crate::message::ToolReturn;
use crate::tool::{Tool, ToolError, ToolHandler};

/// A tool discovered on a server.
#[derive(Debug, Clone)]
struct RemoteTool {
    server: String,
    name: String,
    description: String,
    input_schema: Value,
}

/// Calls one tool on one server.
struct McpToolHandler {
    peer: Peer<RoleClient>,
    server: String,
    name: String,
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    async fn call(&self, arguments: Value) -> Result<ToolReturn, ToolError> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            _ => None,
        };
        tracing::debug!(server = %self.server, tool = %self.name, "mcp: calling tool");

        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                name: Cow::Owned(self.name.clone()),
                arguments,
                meta: None,
                task: None,
            })
            .await
            .map_err(|e| {
                tracing::warn!(server = %self.server, tool = %self.name, error = %e, "mcp: tool call failed");
                ToolError::Failed(format!("MCP tool call failed: {}", e))
            })?;

        convert_result(result)
    }
}

/// Connections to MCP servers and the tools they expose.
pub struct McpClient {
    /// Connected servers, keyed by server name.
    servers: HashMap<String, RunningService<RoleClient, ()>>,
    /// Discovered tools in discovery order.
    tools: Vec<RemoteTool>,
}

impl McpClient {
    /// Connect to every configured server.
    ///
    /// Spawns a child process per server, connects over stdio and lists its
    /// tools. Servers that fail to start are logged and skipped. When two
    /// servers expose the same tool name, the first one wins.
    pub async fn connect(config: &McpConfig) -> Self {
        let mut servers = HashMap::new();
        let mut tools: Vec<RemoteTool> = Vec::new();

        let mut names: Vec<&String> = config.mcp_servers.keys().collect();
        names.sort();
        for name in names {
            match Self::connect_server(name, &config.mcp_servers[name]).await {
                Ok((client, discovered)) => {
                    tracing::debug!(server = %name, tools = discovered.len(), "mcp: server connected");
                    for tool in discovered {
                        if tools.iter().any(|t| t.name == tool.name) {
                            tracing::warn!(server = %name, tool = %tool.name, "mcp: duplicate tool name, skipping");
                            continue;
                        }
                        tools.push(tool);
                    }
                    servers.insert(name.clone(), client);
                }
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "mcp: server failed to start");
                }
            }
        }

        Self { servers, tools }
    }

    /// Connect to a single MCP server and discover its tools.
    async fn connect_server(
        name: &str,
        config: &McpServerConfig,
    ) -> Result<(RunningService<RoleClient, ()>, Vec<RemoteTool>), McpError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        // stderr is discarded so server logs do not interleave with the event stream.
        let (transport, _stderr) = TokioChildProcess::builder(cmd)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| McpError::ConnectionError {
                server: name.to_string(),
                message: format!("failed to spawn process: {}", e),
            })?;

        let client = ().serve(transport).await.map_err(|e| McpError::ConnectionError {
            server: name.to_string(),
            message: format!("failed to connect: {}", e),
        })?;

        let listed = client
            .list_tools(None)
            .await
            .map_err(|e| McpError::ConnectionError {
                server: name.to_string(),
                message: format!("failed to list tools: {}", e),
            })?;

        let tools = listed
            .tools
            .into_iter()
            .map(|t| RemoteTool {
                server: name.to_string(),
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                input_schema: Value::Object(t.input_schema.as_ref().clone()),
            })
            .collect();

        Ok((client, tools))
    }

    /// Create a client with no servers.
    pub fn empty() -> Self {
        Self {
            servers: HashMap::new(),
            tools: Vec::new(),
        }
    }

    /// Names of the connected servers.
    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of discovered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Check if any tools are available.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Every discovered tool as an executable [`Tool`].
    ///
    /// MCP servers handle one request at a time per connection, so the
    /// tools run sequentially.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .filter_map(|remote| {
                let server = self.servers.get(&remote.server)?;
                Some(
                    Tool::new(remote.name.clone(), remote.description.clone())
                        .with_parameters(remote.input_schema.clone())
                        .with_handler(McpToolHandler {
                            peer: server.peer().clone(),
                            server: remote.server.clone(),
                            name: remote.name.clone(),
                        }),
                )
            })
            .collect()
    }

    /// Gracefully shut down all MCP server connections.
    pub async fn shutdown(self) {
        for (name, server) in self.servers {
            if let Err(e) = server.cancel().await {
                tracing::debug!(server = %name, error = %e, "mcp: shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_has_no_tools() {
        let client = McpClient::empty();
        assert!(!client.has_tools());
        assert_eq!(client.tool_count(), 0);
        assert!(client.tools().is_empty());
        assert!(client.server_names().is_empty());
    }

    #[tokio::test]
    async fn test_unstartable_server_is_skipped() {
        let config: McpConfig = serde_json::from_str(
            r#"{"mcpServers": {"missing": {"command": "/nonexistent/tributary-mcp-server"}}}"#,
        )
        .unwrap();

        let client = McpClient::connect(&config).await;

        assert!(client.server_names().is_empty());
        assert!(!client.has_tools());
    }
}
