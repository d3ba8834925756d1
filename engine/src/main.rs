// Cadence orchestration kernel
// Main entry point for the cadence binary

use clap::Parser;

use cadence_engine::cli::{Cli, Command};
use cadence_engine::config::Config;
use cadence_engine::handlers::{
    handle_history, handle_replay, handle_resume, handle_run, OutputFormat,
};
use cadence_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Cadence kernel v{}", env!("CARGO_PKG_VERSION"));

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the CLI override or config-driven level
    // (only takes effect if RUST_LOG env var is not set)
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    match cli.command {
        Command::Run {
            description,
            priority,
        } => handle_run(&config, &description, priority, format).await,

        Command::Resume { objective_id } => handle_resume(&config, &objective_id, format).await,

        Command::History { limit } => handle_history(&config, limit, format).await,

        Command::Replay { objective_id } => handle_replay(&config, &objective_id, format).await,
    }
}
