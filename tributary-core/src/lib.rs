//! Tributary core library.
//!
//! Normalizes streaming responses from several LLM vendors into one
//! canonical event stream and drives the multi-step tool-calling loop
//! around it.
//!
//! The pieces, from the wire up:
//!
//! - [`wire`] splits response bodies into frames and parses JSON chunks
//! - [`decoder`] turns chunks into vendor-neutral deltas
//! - [`state`] and [`turn`] fold deltas into canonical [`event`]s for one turn
//! - [`tool`] runs the tool calls a turn requested
//! - [`agent`] repeats turns until the model is done
//!
//! [`provider`] encodes requests and pairs each vendor with its decoder,
//! [`transport`] sends them, and [`mcp`] exposes MCP server tools.

pub mod agent;
pub mod config;
pub mod decoder;
pub mod event;
pub mod mcp;
pub mod message;
pub mod observer;
pub mod provider;
pub mod state;
pub mod tool;
pub mod transport;
pub mod turn;
pub mod usage;
pub mod wire;

pub use agent::{Agent, AgentError, Completion, StepLimitPolicy};
pub use event::{EventKind, FinishReason, StreamEvent};
pub use message::{Artifact, Message, Role, ToolCall, ToolResult};
pub use tool::{Tool, ToolError};
pub use usage::Usage;
