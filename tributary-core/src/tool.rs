//! Tools callable by the model.
//!
//! A [`Tool`] couples a name, description and JSON parameter schema with an
//! optional [`ToolHandler`]. Tools without a handler are client-executed:
//! the agent reports their calls but leaves execution to the caller.

mod orchestrator;

pub use orchestrator::{BatchItem, BatchStream, ToolBatch, ToolExecutionError, ToolOrchestrator};

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::message::ToolReturn;

/// Errors returned by tool handlers.
///
/// `Failed` and `InvalidArguments` are domain failures: the orchestrator
/// turns them into a failed result sent back to the model. `Unexpected`
/// aborts the whole tool batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The tool ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The arguments did not match the tool's parameter schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A failure the handler did not anticipate.
    #[error("unexpected tool failure: {0}")]
    Unexpected(String),
}

impl ToolError {
    /// Whether the failure should be reported to the model.
    pub fn is_domain(&self) -> bool {
        !matches!(self, ToolError::Unexpected(_))
    }
}

/// Executes a tool call.
///
/// Handlers are assumed reentrant: concurrent tools may be invoked several
/// times at once.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with validated arguments.
    async fn call(&self, arguments: Value) -> Result<ToolReturn, ToolError>;
}

/// Adapts an async closure to [`ToolHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut, R> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ToolError>> + Send,
    R: Into<ToolReturn> + Send,
{
    async fn call(&self, arguments: Value) -> Result<ToolReturn, ToolError> {
        (self.0)(arguments).await.map(Into::into)
    }
}

/// A tool offered to the model.
///
/// # Examples
///
/// ```
/// use tributary_core::tool::{Tool, ToolError};
///
/// let echo = Tool::new("echo", "Echo the input back")
///     .with_parameters(serde_json::json!({
///         "type": "object",
///         "properties": {"input": {"type": "string"}},
///         "required": ["input"]
///     }))
///     .concurrent(true)
///     .with_handler_fn(|args| async move {
///         Ok::<_, ToolError>(args["input"].as_str().unwrap_or_default().to_string())
///     });
///
/// assert_eq!(echo.name, "echo");
/// assert!(echo.concurrent);
/// assert!(!echo.is_deferred());
/// ```
#[derive(Clone)]
pub struct Tool {
    /// Name the model calls the tool by.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
    /// Whether calls may run in parallel with other concurrent calls.
    pub concurrent: bool,
    handler: Option<Arc<dyn ToolHandler>>,
}

impl Tool {
    /// Create a client-executed tool that takes no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            concurrent: false,
            handler: None,
        }
    }

    /// Set the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Mark the tool as safe to run in parallel.
    #[must_use]
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Attach a handler.
    #[must_use]
    pub fn with_handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Attach an async closure as the handler.
    #[must_use]
    pub fn with_handler_fn<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
        R: Into<ToolReturn> + Send + 'static,
    {
        self.with_handler(FnHandler(handler))
    }

    /// Whether the tool has no handler and must be executed by the caller.
    pub fn is_deferred(&self) -> bool {
        self.handler.is_none()
    }

    /// Check `arguments` against the parameter schema.
    ///
    /// A schema that does not compile is logged and skipped rather than
    /// failing every call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] listing every violation.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let validator = match jsonschema::validator_for(&self.parameters) {
            Ok(validator) => validator,
            Err(e) => {
                tracing::warn!(tool = %self.name, error = %e, "tool: invalid parameter schema, skipping validation");
                return Ok(());
            }
        };

        let errors: Vec<String> = validator
            .iter_errors(arguments)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(errors.join("; ")))
        }
    }

    /// Validate `arguments` and run the handler.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, [`ToolError::InvalidArguments`] on schema
    /// violations, or [`ToolError::Unexpected`] if the tool has no handler.
    pub async fn invoke(&self, arguments: Value) -> Result<ToolReturn, ToolError> {
        let Some(handler) = &self.handler else {
            return Err(ToolError::Unexpected(format!(
                "tool '{}' has no handler",
                self.name
            )));
        };
        self.validate(&arguments)?;
        handler.call(arguments).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("concurrent", &self.concurrent)
            .field("deferred", &self.is_deferred())
            .finish_non_exhaustive()
    }
}
