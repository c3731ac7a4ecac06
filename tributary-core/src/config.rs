//! Configuration management for Tributary.
//!
//! Provides configuration loading from TOML files with support for
//! multiple file locations, environment variable overrides, and sensible defaults.

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::agent::StepLimitPolicy;
use crate::provider::{DEFAULT_MAX_TOKENS, GenerateOptions};

/// Default bound on vendor turns per request.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        /// Path to the configuration file that could not be parsed.
        path: PathBuf,
        /// The underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Vendor name ("openai", "deepseek", "groq", "anthropic", "ollama").
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the provider. The `<VENDOR>_API_KEY` env var wins.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Full endpoint URL replacing the vendor default.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Output token limit per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Step loop settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// MCP settings.
    #[serde(default)]
    pub mcp: Option<McpSettings>,
}

/// The `[agent]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of vendor turns per request.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// What happens when the last permitted step requests tools.
    #[serde(default)]
    pub step_limit: StepLimitPolicy,

    /// System prompt prepended to every request.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Extended thinking budget, for vendors that support one.
    #[serde(default)]
    pub thinking_budget: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_limit: StepLimitPolicy::default(),
            system_prompt: None,
            thinking_budget: None,
        }
    }
}

/// The `[mcp]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct McpSettings {
    /// Path to the MCP servers JSON file.
    #[serde(default)]
    pub config_path: Option<String>,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

impl Config {
    /// Load configuration from file system.
    ///
    /// Priority order:
    /// 1. TRIBUTARY_CONFIG environment variable
    /// 2. ./config.toml (local directory)
    /// 3. ~/.config/tributary/config.toml (user config)
    ///
    /// Returns default config if no config file found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if a found file cannot be read.
    /// Returns [`ConfigError::ParseError`] if a found file is not valid TOML.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("TRIBUTARY_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Self::load_from(p);
            }
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Self::load_from(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config/tributary/config.toml");
            if user_config.exists() {
                return Self::load_from(user_config);
            }
        }

        tracing::debug!("config: no file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read.
    /// Returns [`ConfigError::ParseError`] if the file is not valid TOML.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config: loaded");
        Ok(config)
    }

    /// Generation settings derived from this configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::config::Config;
    ///
    /// let config: Config = toml::from_str("max_tokens = 512\n[agent]\nthinking_budget = 256").unwrap();
    /// let options = config.generate_options();
    /// assert_eq!(options.max_tokens, 512);
    /// assert_eq!(options.thinking_budget, Some(256));
    /// ```
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            thinking_budget: self.agent.thinking_budget,
        }
    }

    /// The MCP config path from the `[mcp]` section, if any.
    pub fn mcp_config_path(&self) -> Option<&str> {
        self.mcp.as_ref().and_then(|m| m.config_path.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            agent: AgentConfig::default(),
            mcp: None,
        }
    }
}
