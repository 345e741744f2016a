// CodeGen coding assistant
// Main entry point for the codegen binary

use anyhow::Context;
use clap::Parser;
use codegen_engine::cli::{Cli, Command};
use codegen_engine::config::Config;
use codegen_engine::confirmation::ConfirmationGate;
use codegen_engine::handlers::{handle_history, handle_run, handle_set_key, OutputFormat};
use codegen_engine::repl::run_repl;
use codegen_engine::session::Session;
use codegen_engine::telemetry::init_telemetry_with_level;

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
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::load_or_create().context("Failed to load default config")?
    };

    // Command-line flags win over the file
    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
    }
    if let Some(workspace) = &cli.workspace {
        config
            .set_workspace(workspace)
            .with_context(|| format!("Invalid workspace {}", workspace.display()))?;
    }
    if let Some(max) = cli.max_iterations {
        config.core.max_iterations = max;
    }
    if cli.yes {
        config.security.auto_confirm = true;
    }
    config.validate_and_process()?;

    // Only takes effect if RUST_LOG is not set
    init_telemetry_with_level(&config.core.log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("CodeGen v{} ({} - {})", version, commit, timestamp);
    tracing::debug!(workspace = %config.core.workspace.display(), "Workspace selected");

    let gate = ConfirmationGate::interactive(config.security.auto_confirm);

    match cli.command {
        None => {
            let session = Session::new(config, gate).context("Failed to start session")?;
            run_repl(session, format).await?;
            // A stdin read may still be parked on a blocking thread
            std::process::exit(0);
        }

        Some(Command::Run { task }) => {
            let mut session = Session::new(config, gate)?;
            if !handle_run(&task, &mut session, format).await? {
                std::process::exit(1);
            }
            Ok(())
        }

        Some(Command::History { limit }) => {
            let limit = limit.unwrap_or(config.core.history_limit);
            let session = Session::new(config, gate)?;
            handle_history(limit, &session, format).await
        }

        Some(Command::SetKey { key }) => handle_set_key(key, &config, format).await,
    }
}
