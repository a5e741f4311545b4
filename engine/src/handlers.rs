//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: Interactive session
//! - ask: Send one message, optionally waiting for the backtest it starts
//! - status: Query one backtest task
//! - config: Show the effective configuration or its location

use anyhow::{Context, Result};
use sdk::errors::CopilotErrorExt;
use sdk::types::{BacktestResult, ConversationMessage, Role};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{BackendApi, HttpBackend};
use crate::cli::ConfigAction;
use crate::config::Config;
use crate::conversation::{Conversation, ConversationController, SubmitOutcome};
use crate::message_bus::{Event, EventType, MessageBus};
use crate::tracker::CycleOutcome;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build a controller wired to the configured HTTP backend
pub fn build_controller(config: &Config) -> Result<ConversationController> {
    let backend = HttpBackend::from_config(&config.backend)
        .context("Failed to create backend client")?;

    tracing::debug!("Using backend at {}", backend.base_url());

    let conversation = Conversation::with_limit(MessageBus::new(), config.conversation.max_messages);

    Ok(ConversationController::new(
        Arc::new(backend),
        conversation,
        config.tracker.poll_interval(),
    ))
}

/// One conversation line as printed in the terminal
pub fn render_message(message: &ConversationMessage) -> String {
    match message.role {
        Role::User => format!("you> {}", message.content),
        Role::Assistant => format!("copilot> {}", message.content),
    }
}

/// Indented block describing a backtest result
pub fn render_result(result: &BacktestResult) -> String {
    let lines = result.summary_lines();
    if lines.is_empty() {
        return "  (empty result)".to_string();
    }
    lines
        .iter()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// How long the chat session waits for queued output on exit
const RENDER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Print conversation events until every publisher is gone
///
/// User messages are not echoed; the user just typed them.
async fn render_events<W: Write>(mut events: mpsc::Receiver<Event>, mut out: W) {
    while let Some(event) = events.recv().await {
        let text = match event {
            Event::MessageAppended { message } if message.role == Role::Assistant => {
                render_message(&message)
            }
            Event::ResultUpdated { result } => render_result(&result),
            Event::TrackingStarted { task_id } => format!("  [tracking backtest {}]", task_id),
            _ => continue,
        };
        writeln!(out, "{}", text).ok();
        out.flush().ok();
    }
}

/// Let the renderer print what is still queued, up to `limit`
async fn finish_renderer(renderer: JoinHandle<()>, limit: Duration) {
    if tokio::time::timeout(limit, renderer).await.is_err() {
        tracing::debug!(
            "Renderer still busy after {}ms, exiting anyway",
            limit.as_millis()
        );
    }
}

/// Interactive chat session
///
/// Reads one message per stdin line. Messages produced later by the job
/// tracker are printed as they arrive.
pub async fn handle_chat(config: &Config) -> Result<()> {
    let controller = build_controller(config)?;
    let events = controller.conversation().bus().subscribe(EventType::All);

    let renderer = tokio::spawn(render_events(events, std::io::stdout()));

    println!("Connected to {}", config.backend.base_url);
    println!("Type a message, /help for commands, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("  /result   show the latest backtest result");
                println!("  /history  show the conversation so far");
                println!("  /quit     leave the session");
            }
            "/result" => match controller.conversation().latest_result() {
                Some(result) => println!("{}", render_result(&result)),
                None => println!("  (no backtest result yet)"),
            },
            "/history" => {
                for message in controller.conversation().messages() {
                    println!("{}", render_message(&message));
                }
            }
            text => {
                controller.submit(text).await;
            }
        }
    }

    // The renderer ends once the last bus handle is gone
    controller.shutdown();
    drop(controller);
    finish_renderer(renderer, RENDER_DRAIN_TIMEOUT).await;

    Ok(())
}

/// Send one message and print the transcript
pub async fn handle_ask(
    message: String,
    wait: bool,
    timeout: Duration,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let controller = build_controller(config)?;
    let mut finished = controller
        .conversation()
        .bus()
        .subscribe(EventType::TrackingFinished);

    let outcome = controller.submit(&message).await;

    let mut tracking: Option<CycleOutcome> = None;
    if let (true, SubmitOutcome::Replied { task_id: Some(task_id) }) = (wait, &outcome) {
        tracing::info!("Waiting up to {}s for task {}", timeout.as_secs(), task_id);

        let waited = tokio::time::timeout(timeout, async {
            while let Some(event) = finished.recv().await {
                if let Event::TrackingFinished {
                    task_id: finished_id,
                    outcome,
                } = event
                {
                    if &finished_id == task_id {
                        return Some(outcome);
                    }
                }
            }
            None
        })
        .await;

        match waited {
            Ok(result) => tracking = result,
            Err(_) => tracing::warn!("Gave up waiting for task {} after {}s", task_id, timeout.as_secs()),
        }
    }

    controller.shutdown();

    let conversation = controller.conversation();
    match format {
        OutputFormat::Json => {
            let output = json!({
                "submit": outcome,
                "tracking": tracking,
                "messages": conversation.messages(),
                "result": conversation.latest_result(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for message in conversation.messages() {
                println!("{}", render_message(&message));
            }
            if let Some(result) = conversation.latest_result() {
                println!("{}", render_result(&result));
            }
            if let SubmitOutcome::Replied {
                task_id: Some(task_id),
            } = &outcome
            {
                match tracking {
                    Some(outcome) => println!("  [backtest {} {}]", task_id, outcome),
                    None if wait => println!("  [backtest {} still running]", task_id),
                    None => println!(
                        "  [backtest {} started; check it with `copilot status {}`]",
                        task_id, task_id
                    ),
                }
            }
        }
    }

    Ok(())
}

/// Query one backtest task and print its status
pub async fn handle_status(task_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let backend = HttpBackend::from_config(&config.backend)
        .context("Failed to create backend client")?;

    let status = match backend.task_status(&task_id).await {
        Ok(status) => status,
        Err(e) => {
            let hint = e.user_hint().to_string();
            return Err(anyhow::Error::new(e).context(hint));
        }
    };

    match format {
        OutputFormat::Json => {
            let output = json!({
                "task_id": task_id,
                "status": status.status,
                "result": status.result,
                "error": status.error,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Task {}: {}", task_id, status.status);
            if let Some(error) = &status.error {
                println!("  error: {}", error);
            }
            if let Some(result) = &status.result {
                println!("{}", render_result(result));
            }
        }
    }

    Ok(())
}

/// Show the effective configuration or its location
pub fn handle_config(
    action: ConfigAction,
    config: &Config,
    config_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match (action, format) {
        (ConfigAction::Path, OutputFormat::Json) => {
            println!("{}", json!({ "path": config_path }));
        }
        (ConfigAction::Path, OutputFormat::Text) => {
            println!("{}", config_path.display());
        }
        (ConfigAction::Show, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        (ConfigAction::Show, OutputFormat::Text) => {
            let toml_string =
                toml::to_string_pretty(config).context("Failed to serialize config")?;
            print!("{}", toml_string);
        }
    }
    Ok(())
}
