//! Tool batch execution.
//!
//! [`ToolOrchestrator`] runs the tool calls of one completed turn:
//!
//! 1. resolve each call name against the tool set (missing or ambiguous names
//!    become failed results)
//! 2. skip client-executed tools and flag the batch as deferred
//! 3. run sequential tools one at a time in call order
//! 4. run concurrent tools as independent tasks and await all of them
//!
//! Results are written back by original call position, so the returned list
//! always follows call order whatever order the tools finished in.


use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::{FutureExt, Stream, StreamExt};
use tokio::task::JoinSet;

use super::{Tool, ToolError};
use crate::event::{EventKind, StreamEvent};
use crate::message::{ToolCall, ToolResult, ToolReturn};
use crate::observer::Observer;

/// Errors that abort a tool batch.
#[derive(Debug, thiserror::Error)]
pub enum ToolExecutionError {
    /// A handler returned [`ToolError::Unexpected`].
    #[error("tool '{tool}' failed unexpectedly: {message}")]
    Unexpected {
        /// Tool name.
        tool: String,
        /// Error message.
        message: String,
    },

    /// A handler panicked.
    #[error("tool '{tool}' panicked: {message}")]
    Panicked {
        /// Tool name.
        tool: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A concurrent task was cancelled before it finished.
    #[error("tool task was cancelled: {0}")]
    Cancelled(String),
}

/// Outcome of one tool batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolBatch {
    /// One result per executed call, in call order.
    pub results: Vec<ToolResult>,
    /// Whether any call targeted a client-executed tool.
    pub has_deferred: bool,
}

/// Item yielded by [`ToolOrchestrator::execute_stream`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// A `ToolResult` or `Artifact` event.
    Event(StreamEvent),
    /// The batch finished; always the last item.
    Done(ToolBatch),
}

/// Stream of batch items.
pub type BatchStream<'a> =
    Pin<Box<dyn Stream<Item = Result<BatchItem, ToolExecutionError>> + Send + 'a>>;

type Invocation = Result<Result<ToolReturn, ToolError>, String>;

/// Executes tool calls against a tool set.
#[derive(Clone, Copy)]
pub struct ToolOrchestrator<'a> {
    tools: &'a [Tool],
    observer: &'a dyn Observer,
}

impl<'a> ToolOrchestrator<'a> {
    /// Create an orchestrator over `tools`.
    pub fn new(tools: &'a [Tool], observer: &'a dyn Observer) -> Self {
        Self { tools, observer }
    }

    /// Run a batch and return its results in call order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError`] if a handler fails unexpectedly or
    /// panics. Domain failures are reported as failed results instead.
    pub async fn execute(
        &self,
        calls: Vec<ToolCall>,
        message_id: &str,
    ) -> Result<ToolBatch, ToolExecutionError> {
        let mut stream = self.execute_stream(calls, message_id.to_string());
        while let Some(item) = stream.next().await {
            if let BatchItem::Done(batch) = item? {
                return Ok(batch);
            }
        }
        Ok(ToolBatch::default())
    }

    /// Run a batch, yielding result and artifact events as tools finish.
    ///
    /// Events follow completion order; the final [`BatchItem::Done`] carries
    /// the results in call order. Dropping the stream aborts outstanding
    /// concurrent tasks.
    pub fn execute_stream(&self, calls: Vec<ToolCall>, message_id: String) -> BatchStream<'a> {
        let tools = self.tools;
        let observer = self.observer;

        Box::pin(async_stream::stream! {
            let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
            let mut sequential: Vec<(usize, ToolCall, Tool)> = Vec::new();
            let mut concurrent: Vec<(usize, ToolCall, Tool)> = Vec::new();
            let mut has_deferred = false;

            for (index, call) in calls.into_iter().enumerate() {
                match resolve(tools, call.name()) {
                    Err(message) => {
                        tracing::debug!(tool = call.name(), %message, "orchestrator: resolution failed");
                        let result = ToolResult::failure(&call, message);
                        observer.tool_call_started(&call);
                        observer.tool_call_finished(&result);
                        for event in result_events(&result, &message_id) {
                            yield Ok(BatchItem::Event(event));
                        }
                        slots[index] = Some(result);
                    }
                    Ok(tool) if tool.is_deferred() => {
                        tracing::debug!(tool = call.name(), "orchestrator: deferred to client");
                        has_deferred = true;
                    }
                    Ok(tool) if tool.concurrent => concurrent.push((index, call, tool.clone())),
                    Ok(tool) => sequential.push((index, call, tool.clone())),
                }
            }

            tracing::debug!(
                sequential = sequential.len(),
                concurrent = concurrent.len(),
                has_deferred,
                "orchestrator: executing batch"
            );

            for (index, call, tool) in sequential {
                observer.tool_call_started(&call);
                let outcome = invoke(&tool, &call).await;
                match settle(&call, outcome) {
                    Ok(result) => {
                        observer.tool_call_finished(&result);
                        for event in result_events(&result, &message_id) {
                            yield Ok(BatchItem::Event(event));
                        }
                        slots[index] = Some(result);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let mut tasks = JoinSet::new();
            for (index, call, tool) in concurrent {
                observer.tool_call_started(&call);
                tasks.spawn(async move {
                    let outcome = invoke(&tool, &call).await;
                    (index, call, outcome)
                });
            }

            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                let (index, call, outcome) = match joined {
                    Ok(done) => done,
                    Err(e) => {
                        first_error.get_or_insert(ToolExecutionError::Cancelled(e.to_string()));
                        continue;
                    }
                };
                match settle(&call, outcome) {
                    Ok(result) => {
                        observer.tool_call_finished(&result);
                        for event in result_events(&result, &message_id) {
                            yield Ok(BatchItem::Event(event));
                        }
                        slots[index] = Some(result);
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = first_error {
                yield Err(e);
                return;
            }

            let results: Vec<ToolResult> = slots.into_iter().flatten().collect();
            yield Ok(BatchItem::Done(ToolBatch { results, has_deferred }));
        })
    }
}

/// Find the single tool named `name`.
fn resolve<'t>(tools: &'t [Tool], name: &str) -> Result<&'t Tool, String> {
    let mut matches = tools.iter().filter(|t| t.name == name);
    match (matches.next(), matches.next()) {
        (Some(tool), None) => Ok(tool),
        (None, _) => Err(format!("Tool '{}' not found", name)),
        (Some(_), Some(_)) => Err(format!("Multiple tools named '{}' found", name)),
    }
}

/// Run one call, capturing panics.
async fn invoke(tool: &Tool, call: &ToolCall) -> Invocation {
    AssertUnwindSafe(tool.invoke(call.arguments_value()))
        .catch_unwind()
        .await
        .map_err(panic_message)
}

/// Turn an invocation into a result, or an error that aborts the batch.
fn settle(call: &ToolCall, outcome: Invocation) -> Result<ToolResult, ToolExecutionError> {
    match outcome {
        Ok(Ok(value)) => {
            let (result, artifacts) = value.into_parts();
            Ok(ToolResult::success(call, result, artifacts))
        }
        Ok(Err(e)) if e.is_domain() => Ok(ToolResult::failure(call, e.to_string())),
        Ok(Err(e)) => Err(ToolExecutionError::Unexpected {
            tool: call.name().to_string(),
            message: e.to_string(),
        }),
        Err(message) => Err(ToolExecutionError::Panicked {
            tool: call.name().to_string(),
            message,
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The result event followed by one event per artifact.
fn result_events(result: &ToolResult, message_id: &str) -> Vec<StreamEvent> {
    let error = result.is_error.then(|| result.result.to_text());
    let mut events = vec![StreamEvent::new(EventKind::ToolResult {
        tool_result: result.clone(),
        message_id: message_id.to_string(),
        success: !result.is_error,
        error,
    })];
    events.extend(result.artifacts.iter().map(|artifact| {
        StreamEvent::new(EventKind::Artifact {
            artifact: artifact.clone(),
            tool_call_id: result.tool_call_id.clone(),
            tool_name: result.tool_name.clone(),
            message_id: message_id.to_string(),
        })
    }));
    events
}
