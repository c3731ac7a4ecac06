//! Lifecycle notifications.
//!
//! The agent reports turn and tool-call boundaries to an [`Observer`].
//! Exporting them anywhere is the observer's business.

use crate::message::{ToolCall, ToolResult};
use crate::usage::Usage;

/// Receives ordered lifecycle notifications from the agent.
///
/// Every hook has a no-op default, so implementations only override what
/// they care about.
pub trait Observer: Send + Sync {
    /// A vendor turn is about to be requested.
    fn turn_started(&self, _step: usize, _provider: &str, _model: &str) {}

    /// A vendor turn completed with the given per-turn usage.
    fn turn_finished(&self, _step: usize, _usage: &Usage) {}

    /// A tool call is about to run.
    fn tool_call_started(&self, _call: &ToolCall) {}

    /// A tool call produced its result.
    fn tool_call_finished(&self, _result: &ToolResult) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that logs notifications through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn turn_started(&self, step: usize, provider: &str, model: &str) {
        tracing::info!(step, provider, model, "turn started");
    }

    fn turn_finished(&self, step: usize, usage: &Usage) {
        tracing::info!(
            step,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "turn finished"
        );
    }

    fn tool_call_started(&self, call: &ToolCall) {
        tracing::info!(tool = call.name(), id = call.id(), "tool call started");
    }

    fn tool_call_finished(&self, result: &ToolResult) {
        tracing::info!(
            tool = %result.tool_name,
            id = %result.tool_call_id,
            is_error = result.is_error,
            "tool call finished"
        );
    }
}
