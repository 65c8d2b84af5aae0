//! CLI Entry Point for rust_telemetry
//!
//! Provides a command-line interface for:
//! - Watching a moving window fed by the mock power source
//! - Checking a configuration file without starting anything
//!
//! # Usage
//!
//! Watch for a minute using a config file:
//! ```bash
//! rust_telemetry watch --config config/telemetry.toml --duration 1m
//! ```
//!
//! Validate a configuration:
//! ```bash
//! rust_telemetry check-config --config config/telemetry.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_telemetry::config::{TelemetryConfig, DEFAULT_CONFIG_PATH};
use rust_telemetry::source::MockPowerSource;
use rust_telemetry::timeseries::MovingWindow;
use rust_telemetry::tracing_setup;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rust_telemetry")]
#[command(about = "Moving window over a live telemetry stream", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed the mock power source into a moving window and report on it
    Watch {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Stop after this long (e.g. "30s", "5m"); runs until Ctrl+C otherwise
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        duration: Option<Duration>,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { config, duration } => watch(config, duration).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: &Path) -> Result<TelemetryConfig> {
    let config = TelemetryConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;
    println!("Configuration {} is valid", path.display());
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn watch(path: PathBuf, duration: Option<Duration>) -> Result<()> {
    let config = load_config(&path)?;
    tracing_setup::init_from_config(&config)?;
    info!(application = %config.application.name, "Starting");

    let (tx, rx) = mpsc::channel(config.window.channel_capacity);
    let mut builder = MovingWindow::builder(config.window.size, rx, config.window.input_sampling_period)
        .name(config.application.name.clone())
        .align_to(config.align_to());
    if let Some(resampler) = config.resampler_config()? {
        builder = builder.resampler_config(resampler);
    }
    let mut window = builder.build()?;

    let source = MockPowerSource::new(config.source.clone())?;
    let mut source_handle = source.spawn(tx);

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut reports = tokio::time::interval(config.application.report_interval);
    reports.tick().await;

    loop {
        tokio::select! {
            _ = reports.tick() => report(&window),
            _ = &mut deadline => {
                info!("Requested duration elapsed");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Ctrl+C received");
                break;
            }
        }
    }

    let source_outcome = source_handle.stop().await;
    if source_outcome.is_failure() {
        warn!(outcome = ?source_outcome, "Source ended with a failure");
    }
    window.stop().await?;
    report(&window);
    info!("Shutdown complete");
    Ok(())
}

/// Log summary statistics over the valid values of the window.
fn report(window: &MovingWindow) {
    let values: Vec<f64> = window.to_vec().into_iter().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        info!(slots = window.len(), "Window has no values yet");
        return;
    }

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    info!(
        slots = window.len(),
        valid = count,
        oldest = ?window.time_bound_oldest(),
        newest = ?window.time_bound_newest(),
        mean,
        min,
        max,
        "Window report"
    );
}
