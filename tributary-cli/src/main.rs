//! Tributary CLI - stream one prompt through the agent loop.

use std::io::{self, IsTerminal, Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;

use tributary_core::config::Config;
use tributary_core::mcp::{McpClient, load_mcp_config};
use tributary_core::observer::TracingObserver;
use tributary_core::transport::ReqwestTransport;
use tributary_core::{Agent, EventKind, Message, Role, StreamEvent};

/// Tributary CLI - stream one prompt through the agent loop
#[derive(Parser)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Prompt to send (reads from stdin if not provided)
    message: Option<String>,

    /// Override the LLM provider from config
    #[arg(short = 'p', long)]
    provider: Option<String>,

    /// Override the model from config
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Override the maximum number of vendor turns
    #[arg(long)]
    max_steps: Option<usize>,

    /// Print every canonical event as one JSON line
    #[arg(long)]
    json: bool,

    /// Skip MCP servers
    #[arg(long)]
    no_mcp: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::load().context("Failed to load config")?;
    apply_overrides(&mut config, &args);

    let prompt = match get_message(&args) {
        Ok(msg) => msg,
        Err(_) => {
            // No input provided, show help
            Args::parse_from(["tributary", "--help"]);
            return Ok(());
        }
    };

    let mcp = if args.no_mcp {
        None
    } else {
        match load_mcp_config(config.mcp_config_path()).context("Failed to load MCP config")? {
            Some(mcp_config) => Some(McpClient::connect(&mcp_config).await),
            None => None,
        }
    };

    let mut agent = Agent::from_config(&config, Arc::new(ReqwestTransport::new()))
        .context("Failed to create agent")?
        .with_observer(TracingObserver);
    if let Some(client) = &mcp {
        agent = agent.with_tools(client.tools());
    }

    let mut messages = vec![Message::new(Role::User, prompt)];
    let outcome = {
        let mut stream = agent.stream(&mut messages);
        let mut stdout = io::stdout();
        let mut stderr = io::stderr();

        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            if args.json {
                                serde_json::to_writer(&mut stdout, &event)
                                    .context("Failed to encode event")?;
                                writeln!(stdout).context("Failed to write event")?;
                            } else {
                                render(&event, &mut stdout, &mut stderr)
                                    .context("Failed to write output")?;
                            }
                            stdout.flush().context("Failed to flush stdout")?;
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok(()),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n[Interrupted]");
                    break Ok(());
                }
            }
        }
    };

    if let Some(client) = mcp {
        client.shutdown().await;
    }

    outcome.context("Agent error")
}

/// Apply command-line overrides to the loaded config.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(provider) = &args.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
}

/// Write one event for a human reader.
///
/// Text goes to `out`; reasoning, tool activity and the final summary go
/// to `err` so that `out` holds only the answer.
fn render(event: &StreamEvent, out: &mut impl Write, err: &mut impl Write) -> io::Result<()> {
    match &event.kind {
        EventKind::TextDelta { delta, .. } => write!(out, "{}", delta),
        EventKind::TextComplete { .. } => writeln!(out),
        EventKind::ThinkingDelta { delta, .. } => write!(err, "{}", delta),
        EventKind::ThinkingComplete { .. } => writeln!(err),
        EventKind::ToolCall { tool_call, .. } => writeln!(
            err,
            "[tool] {}({})",
            tool_call.name(),
            tool_call.arguments_value()
        ),
        EventKind::ToolResult {
            tool_result, error, ..
        } => match error {
            Some(error) => writeln!(err, "[tool] {} failed: {}", tool_result.tool_name, error),
            None => writeln!(err, "[tool] {} -> {}", tool_result.tool_name, truncate(&tool_result.result.to_text(), 120)),
        },
        EventKind::Artifact {
            artifact, tool_name, ..
        } => writeln!(err, "[artifact] {} from {}", artifact.mime_type, tool_name),
        EventKind::ProviderTool {
            tool_type, status, ..
        } => writeln!(err, "[{}] {:?}", tool_type, status),
        EventKind::Citation { citation, .. } => writeln!(
            err,
            "[cite] {}",
            citation
                .url
                .as_deref()
                .or(citation.title.as_deref())
                .unwrap_or(&citation.citation_type)
        ),
        EventKind::Error {
            error_type,
            message,
            recoverable,
        } => writeln!(
            err,
            "[{}] {}: {}",
            if *recoverable { "warning" } else { "error" },
            error_type,
            message
        ),
        EventKind::StreamEnd {
            finish_reason,
            usage,
            ..
        } => writeln!(
            err,
            "[done] {} ({} prompt + {} completion tokens)",
            finish_reason, usage.prompt_tokens, usage.completion_tokens
        ),
        _ => Ok(()),
    }
}

/// Truncate to at most `max` characters, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Retrieves the message from arguments or stdin.
///
/// Priority: positional argument > stdin > error (if TTY)
fn get_message(args: &Args) -> io::Result<String> {
    if let Some(msg) = &args.message {
        return Ok(msg.clone());
    }

    if io::stdin().is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "No message provided",
        ));
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer.trim_end().to_string())
}
