//! MCP (Model Context Protocol) integration.
//!
//! Loads the server list, connects to each server and exposes the tools it
//! advertises as ordinary [`Tool`](crate::tool::Tool)s.

mod protocol;
mod tools;

pub use protocol::{McpConfig, McpServerConfig};
pub use tools::McpClient;

use std::path::PathBuf;

/// Environment variable naming the MCP servers file.
pub const MCP_CONFIG_ENV: &str = "TRIBUTARY_MCP_CONFIG";

/// Errors that occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to load or parse MCP configuration.
    #[error("MCP config error: {0}")]
    ConfigError(String),

    /// Failed to connect to an MCP server.
    #[error("MCP connection error for server '{server}': {message}")]
    ConnectionError {
        /// Name of the server that failed.
        server: String,
        /// Error message.
        message: String,
    },

    /// IO error during MCP operations.
    #[error("MCP IO error: {0}")]
    IoError(String),
}

/// Load MCP configuration from file.
///
/// Path resolution priority:
/// 1. `TRIBUTARY_MCP_CONFIG` env var (highest)
/// 2. `config_path` parameter (from `[mcp] config_path` in config.toml)
/// 3. `~/.config/tributary/mcp_servers.json` (default)
///
/// Returns `None` if no config file exists.
///
/// # Errors
///
/// Returns [`McpError::IoError`] if the file exists but cannot be read and
/// [`McpError::ConfigError`] if it cannot be parsed.
pub fn load_mcp_config(config_path: Option<&str>) -> Result<Option<McpConfig>, McpError> {
    let Some(path) = resolve_config_path(config_path).filter(|p| p.exists()) else {
        tracing::debug!("mcp: no servers file found");
        return Ok(None);
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| McpError::IoError(format!("failed to read {}: {}", path.display(), e)))?;
    let config: McpConfig = serde_json::from_str(&content)
        .map_err(|e| McpError::ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), servers = config.mcp_servers.len(), "mcp: config loaded");
    Ok(Some(config))
}

fn resolve_config_path(config_path: Option<&str>) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(MCP_CONFIG_ENV)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = config_path {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| home.join(".config/tributary/mcp_servers.json"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Serializes tests that touch the `TRIBUTARY_MCP_CONFIG` env var.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn write_servers(file: &str, server: &str) -> PathBuf {
        let path = std::env::temp_dir().join(file);
        let json = format!(
            r#"{{"mcpServers": {{"{}": {{"command": "echo", "args": ["hello"]}}}}}}"#,
            server
        );
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::ConfigError("bad config".to_string());
        assert_eq!(err.to_string(), "MCP config error: bad config");

        let err = McpError::ConnectionError {
            server: "fs-server".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "MCP connection error for server 'fs-server': connection refused"
        );
    }

    #[test]
    fn test_load_mcp_config_missing_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::set_var(MCP_CONFIG_ENV, "/tmp/nonexistent_tributary_mcp.json") };
        let result = load_mcp_config(None);
        assert!(result.unwrap().is_none());
        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::remove_var(MCP_CONFIG_ENV) };
    }

    #[test]
    fn test_load_mcp_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let path = write_servers("tributary_test_mcp_env.json", "env-server");

        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::set_var(MCP_CONFIG_ENV, path.to_str().unwrap()) };
        let config = load_mcp_config(Some("/nonexistent/config_path.json"))
            .unwrap()
            .unwrap();
        assert!(config.mcp_servers.contains_key("env-server"));

        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::remove_var(MCP_CONFIG_ENV) };
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_mcp_config_from_config_path() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let path = write_servers("tributary_test_mcp_path.json", "path-server");

        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::remove_var(MCP_CONFIG_ENV) };
        let config = load_mcp_config(Some(path.to_str().unwrap())).unwrap().unwrap();
        assert!(config.mcp_servers.contains_key("path-server"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_mcp_config_invalid_json() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let path = std::env::temp_dir().join("tributary_test_mcp_invalid.json");
        std::fs::write(&path, "{not json").unwrap();

        // SAFETY: env access is serialized by ENV_MUTEX
        unsafe { std::env::remove_var(MCP_CONFIG_ENV) };
        let result = load_mcp_config(Some(path.to_str().unwrap()));
        assert!(matches!(result, Err(McpError::ConfigError(msg)) if msg.contains("failed to parse")));

        let _ = std::fs::remove_file(&path);
    }
}
