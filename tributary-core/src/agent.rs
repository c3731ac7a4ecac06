//! Step loop controller.
//!
//! Provides [`Agent`], which drives vendor turns and tool batches until the
//! model stops asking for tools, a client-executed tool is requested, or the
//! step budget runs out. Every logical request yields exactly one
//! `StreamStart` and one `StreamEnd`, with one `StepStart`/`StepFinish` pair
//! per vendor turn in between.


use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::config::{Config, DEFAULT_MAX_STEPS};
use crate::event::{Citation, EventKind, FinishReason, StreamEvent};
use crate::message::{Message, Role, ToolCall, ToolResult};
use crate::observer::{NoopObserver, Observer};
use crate::provider::{GenerateOptions, Provider, ProviderError};
use crate::state::StreamState;
use crate::tool::{BatchItem, Tool, ToolBatch, ToolExecutionError, ToolOrchestrator};
use crate::transport::{Transport, TransportError};
use crate::turn::{self, TurnError, TurnItem};
use crate::usage::Usage;

/// Error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The request could not be built or the vendor rejected it.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The request could not be sent.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response stream failed.
    #[error("stream error: {0}")]
    Turn(#[from] TurnError),

    /// A tool failed unexpectedly.
    #[error("tool execution error: {0}")]
    ToolExecution(#[from] ToolExecutionError),

    /// The last permitted step requested more tools.
    #[error("maximum tool-call chain depth exceeded")]
    MaxStepsExceeded,
}

/// What happens when the last permitted step ends with tool calls.
///
/// A last step that finishes without tool calls always ends the stream
/// normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLimitPolicy {
    /// Run the tools, then end the stream with finish reason `tool_calls`.
    #[default]
    Finish,
    /// Fail with [`AgentError::MaxStepsExceeded`] before running the tools.
    Error,
}

/// Boxed stream of agent events.
pub type AgentStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamEvent, AgentError>> + Send + 'a>>;

/// Summary of a whole request, collected by [`Agent::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text of the last turn.
    pub text: String,
    /// Reasoning text of the last turn.
    pub reasoning: Option<String>,
    /// Every tool call requested over the request.
    pub tool_calls: Vec<ToolCall>,
    /// Every tool result produced over the request.
    pub tool_results: Vec<ToolResult>,
    /// Finish reason reported by `StreamEnd`.
    pub finish_reason: FinishReason,
    /// Usage summed over all turns.
    pub usage: Usage,
    /// Citations collected over all turns.
    pub citations: Vec<Citation>,
    /// Number of vendor turns.
    pub steps: usize,
}

/// Drives the multi-step tool-calling loop for one provider.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use tributary_core::agent::Agent;
/// use tributary_core::message::{Message, Role};
/// use tributary_core::provider::OpenAiCompatProvider;
/// use tributary_core::transport::{MockResponse, MockTransport};
///
/// # async fn example() {
/// let transport = MockTransport::new().with_response(MockResponse::sse_data([
///     r#"{"choices":[{"index":0,"delta":{"content":"Hello!"},"finish_reason":"stop"}]}"#,
/// ]));
/// let agent = Agent::new(
///     Box::new(OpenAiCompatProvider::openai("sk-test", "gpt-4o")),
///     Arc::new(transport),
/// )
/// .with_system_prompt("You are a helpful assistant.");
///
/// let mut messages = vec![Message::new(Role::User, "Hi")];
/// let completion = agent.complete(&mut messages).await.unwrap();
/// assert_eq!(completion.text, "Hello!");
/// assert_eq!(messages.len(), 2);
/// # }
/// ```
pub struct Agent {
    provider: Box<dyn Provider>,
    transport: Arc<dyn Transport>,
    tools: Vec<Tool>,
    observer: Arc<dyn Observer>,
    max_steps: usize,
    step_limit: StepLimitPolicy,
    /// Optional system prompt prepended to every provider call.
    ///
    /// Injected on-the-fly via `build_messages()` and never stored in the
    /// caller's history.
    system_prompt: Option<String>,
    options: GenerateOptions,
}

impl Agent {
    /// Create an agent with no tools and default settings.
    pub fn new(provider: Box<dyn Provider>, transport: Arc<dyn Transport>) -> Self {
        Self {
            provider,
            transport,
            tools: Vec::new(),
            observer: Arc::new(NoopObserver),
            max_steps: DEFAULT_MAX_STEPS,
            step_limit: StepLimitPolicy::default(),
            system_prompt: None,
            options: GenerateOptions::default(),
        }
    }

    /// Create an agent from application configuration.
    ///
    /// Calls [`create_provider`](crate::provider::create_provider) and applies
    /// the `[agent]` section and generation settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the configured provider cannot be created
    /// (e.g., missing API key, unknown provider name).
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, ProviderError> {
        let provider = crate::provider::create_provider(config)?;
        let agent = Self::new(provider, transport)
            .with_max_steps(config.agent.max_steps)
            .with_step_limit(config.agent.step_limit)
            .with_options(config.generate_options());
        Ok(match config.agent.system_prompt {
            Some(ref prompt) => agent.with_system_prompt(prompt),
            None => agent,
        })
    }

    /// Set the tools offered to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Add one tool.
    #[must_use]
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set the telemetry observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Bound the number of vendor turns per request. Values below one are
    /// treated as one.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Choose what happens when the last step requests tools.
    #[must_use]
    pub fn with_step_limit(mut self, policy: StepLimitPolicy) -> Self {
        self.step_limit = policy;
        self
    }

    /// Set the system prompt prepended to every provider call.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set generation options.
    #[must_use]
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// The provider.
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// The tools offered to the model.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Build the message slice for a provider call, prepending the system prompt
    /// when configured.
    ///
    /// The caller's messages are never mutated with the system message.
    fn build_messages(&self, messages: &[Message]) -> Vec<Message> {
        match &self.system_prompt {
            Some(prompt) => {
                let mut result = Vec::with_capacity(messages.len() + 1);
                result.push(Message::new(Role::System, prompt));
                result.extend_from_slice(messages);
                result
            }
            None => messages.to_vec(),
        }
    }

    /// Stream one logical request.
    ///
    /// Each step appends the assistant turn to `messages`, followed by a tool
    /// message when tools ran, so `messages` holds the whole exchange once
    /// the stream ends. Dropping the stream early releases the response body
    /// and aborts outstanding concurrent tools.
    pub fn stream<'a>(&'a self, messages: &'a mut Vec<Message>) -> AgentStream<'a> {
        Box::pin(async_stream::stream! {
            let provider_name = self.provider.name();
            let model = self.provider.model();
            let decoder = self.provider.decoder();
            let mut state = StreamState::new();

            state.stream_started = true;
            yield Ok(StreamEvent::new(EventKind::StreamStart {
                model: model.to_string(),
                provider: provider_name.to_string(),
            }));

            let mut step = 0;
            loop {
                step += 1;
                let last_step = step >= self.max_steps;

                state.step_started = true;
                self.observer.turn_started(step, provider_name, model);
                yield Ok(StreamEvent::new(EventKind::StepStart {}));

                let request = match self.provider.build_request(
                    &self.build_messages(messages.as_slice()),
                    &self.tools,
                    &self.options,
                ) {
                    Ok(request) => request,
                    Err(e) => {
                        yield Err(AgentError::Provider(e));
                        return;
                    }
                };

                tracing::debug!(step, provider = provider_name, url = %request.url, "agent: sending request");
                let response = match self.transport.send(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(AgentError::Transport(e));
                        return;
                    }
                };
                if !response.is_success() {
                    let status = response.status;
                    let retry_after = response.header("retry-after").map(str::to_string);
                    let body = response.text_prefix().await;
                    tracing::debug!(step, status, "agent: vendor rejected request");
                    yield Err(AgentError::Provider(ProviderError::from_status(
                        status,
                        retry_after.as_deref(),
                        body,
                    )));
                    return;
                }

                let mut outcome = None;
                {
                    let mut turn = turn::run(decoder, response.body, &mut state);
                    while let Some(item) = turn.next().await {
                        match item {
                            Ok(TurnItem::Event(event)) => yield Ok(event),
                            Ok(TurnItem::Finished(done)) => outcome = Some(done),
                            Err(e) => {
                                yield Err(AgentError::Turn(e));
                                return;
                            }
                        }
                    }
                }
                // `turn::run` always ends with an outcome or an error.
                let Some(outcome) = outcome else { return };
                self.observer.turn_finished(step, &outcome.usage);

                if !outcome.has_tool_calls() {
                    messages.push(Message::assistant_turn(outcome.text, outcome.reasoning, Vec::new()));
                    state.step_started = false;
                    yield Ok(StreamEvent::new(EventKind::StepFinish {}));
                    break;
                }

                if last_step && self.step_limit == StepLimitPolicy::Error {
                    tracing::debug!(step, max_steps = self.max_steps, "agent: tool calls on last step");
                    yield Err(AgentError::MaxStepsExceeded);
                    return;
                }

                messages.push(Message::assistant_turn(
                    outcome.text,
                    outcome.reasoning,
                    outcome.tool_calls.clone(),
                ));

                let orchestrator = ToolOrchestrator::new(&self.tools, self.observer.as_ref());
                let mut batch = ToolBatch::default();
                {
                    let mut items = orchestrator.execute_stream(outcome.tool_calls, state.message_id.clone());
                    while let Some(item) = items.next().await {
                        match item {
                            Ok(BatchItem::Event(event)) => yield Ok(event),
                            Ok(BatchItem::Done(done)) => batch = done,
                            Err(e) => {
                                yield Err(AgentError::ToolExecution(e));
                                return;
                            }
                        }
                    }
                }

                if !batch.results.is_empty() {
                    messages.push(Message::tool_results(batch.results));
                }
                state.step_started = false;
                yield Ok(StreamEvent::new(EventKind::StepFinish {}));

                if batch.has_deferred || last_step {
                    tracing::debug!(step, has_deferred = batch.has_deferred, "agent: stopping after tool batch");
                    break;
                }
                state.reset();
            }

            let finish_reason = state.finish_reason.clone().unwrap_or(FinishReason::Unknown);
            let usage = state.total_usage();
            tracing::debug!(steps = step, %finish_reason, total_tokens = usage.total_tokens(), "agent: stream end");
            yield Ok(StreamEvent::new(EventKind::StreamEnd {
                finish_reason,
                usage,
                citations: state.citations.clone(),
                additional_content: state.additional_content.clone(),
            }));
        })
    }

    /// Stream a request with owned messages.
    ///
    /// Like [`stream`](Agent::stream), but takes ownership of the messages vec.
    /// This avoids borrow-checker issues in event loops where the stream must
    /// coexist with other mutable state.
    pub fn stream_owned(&self, messages: Vec<Message>) -> AgentStream<'_> {
        Box::pin(async_stream::stream! {
            let mut messages = messages;
            let mut inner = self.stream(&mut messages);
            while let Some(item) = inner.next().await {
                yield item;
            }
        })
    }

    /// Run a request to completion and summarize it.
    ///
    /// # Errors
    ///
    /// Returns the first [`AgentError`] the stream produced.
    pub async fn complete(&self, messages: &mut Vec<Message>) -> Result<Completion, AgentError> {
        let mut stream = self.stream(messages);

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();
        let mut steps = 0;
        let mut end = None;

        while let Some(event) = stream.next().await {
            match event?.kind {
                EventKind::StepStart {} => {
                    steps += 1;
                    text.clear();
                    reasoning.clear();
                }
                EventKind::TextDelta { delta, .. } => text.push_str(&delta),
                EventKind::ThinkingDelta { delta, .. } => reasoning.push_str(&delta),
                EventKind::ToolCall { tool_call, .. } => tool_calls.push(tool_call),
                EventKind::ToolResult { tool_result, .. } => tool_results.push(tool_result),
                EventKind::StreamEnd {
                    finish_reason,
                    usage,
                    citations,
                    ..
                } => end = Some((finish_reason, usage, citations)),
                _ => {}
            }
        }

        let (finish_reason, usage, citations) =
            end.unwrap_or((FinishReason::Unknown, Usage::default(), Vec::new()));
        Ok(Completion {
            text,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls,
            tool_results,
            finish_reason,
            usage,
            citations,
            steps,
        })
    }
}
