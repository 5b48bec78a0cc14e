//! Consensus-gated futures trading bot - entry point.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use quorum_bot::{AppConfig, Application};
use tracing::info;

/// Run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// Run one cycle and exit.
    Single,
    /// Run cycles on the configured interval until interrupted.
    Continuous,
}

/// Consensus-gated futures trading bot.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via QUORUM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Run mode
    #[arg(long, value_enum, default_value = "continuous")]
    mode: RunMode,

    /// Override the cycle interval (minutes)
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    quorum_telemetry::init_logging()?;

    info!("Starting quorum bot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(path)?
        }
        None => AppConfig::load()?,
    };

    if let Some(interval) = args.interval {
        config.trading.interval_minutes = interval;
    }

    let mut app = Application::new(config)?;

    match args.mode {
        RunMode::Single => {
            let outcome = app.run_single_cycle().await?;
            info!(
                proposals = outcome.proposals,
                decisions = outcome.decisions,
                executed = outcome.summary.executed,
                failed = outcome.summary.failed,
                "Single cycle complete"
            );
        }
        RunMode::Continuous => {
            app.run_continuous().await?;
        }
    }

    Ok(())
}
