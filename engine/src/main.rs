// Quant Copilot
// Main entry point for the copilot binary

use clap::Parser;
use copilot_engine::cli::{Cli, Command};
use copilot_engine::config::Config;
use copilot_engine::handlers::{
    handle_ask, handle_chat, handle_config, handle_status, OutputFormat,
};
use copilot_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let loaded = if cli.config.is_some() {
        Config::load_from_path(&config_path)
    } else {
        Config::load_or_create()
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(url) = &cli.backend_url {
        config.set_backend_url(url.as_str())?;
    }

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Quant Copilot v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Chat => {
            tracing::info!("Starting chat session...");
            handle_chat(&config).await
        }

        Command::Ask {
            message,
            wait,
            timeout,
        } => {
            tracing::info!("Sending message: {}", message);
            handle_ask(message, wait, Duration::from_secs(timeout), &config, format).await
        }

        Command::Status { task_id } => {
            tracing::info!("Checking task: {}", task_id);
            handle_status(task_id, &config, format).await
        }

        Command::Config { action } => {
            tracing::info!("Config inspection: {:?}", action);
            handle_config(action, &config, &config_path, format)
        }
    }
}
