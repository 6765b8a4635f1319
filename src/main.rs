//! # Flight Recorder
//!
//! Record flight simulator telemetry and detect takeoff and landing.
//!
//! # Usage
//!
//! Record until Ctrl+C (or until the flight ends, with auto-end enabled):
//! ```bash
//! flight-recorder record --config config/default.toml
//! ```
//!
//! Re-run phase detection over a stored session:
//! ```bash
//! flight-recorder replay data/2024-05-01T1432.json
//! ```
//!
//! Expected output while recording:
//! ```text
//! INFO flight_recorder::telemetry::tcp: Connected to telemetry bridge at 127.0.0.1:5077
//! INFO flight_recorder::recorder: Recording started (7 channels)
//! INFO flight_recorder::recorder: Sampling at 4Hz
//! INFO flight_recorder::session: Takeoff detected at 182.5s
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use flight_recorder::config::Config;
use flight_recorder::postflight::export::{default_file_name, document_channels, load_document};
use flight_recorder::recorder::{run, Recorder, StopReason};
use flight_recorder::telemetry::{ReplaySource, TcpSource, TelemetryAdapter};

/// Configuration used when `--config` is not given and the file exists
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Base name of the daily log file
const LOG_FILE_NAME: &str = "flight-recorder.log";

#[derive(Parser)]
#[command(name = "flight-recorder", version)]
#[command(about = "Record flight simulator telemetry and detect takeoff and landing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from the telemetry bridge
    Record {
        /// Configuration file (TOML format)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the session document, overrides the configuration
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Run phase detection over a recorded session document
    Replay {
        /// Session document (JSON)
        file: PathBuf,

        /// Configuration file (TOML format)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Record { config, output_dir } => {
            let config = load_config(config.as_deref())?;
            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output.dir));
            let _guard = init_logging(config.logging.file.then_some(output_dir.as_path()));
            record(&config, &output_dir).await
        }
        Commands::Replay { file, config } => {
            let config = load_config(config.as_deref())?;
            let _guard = init_logging(None);
            replay(&config, &file).await
        }
    }
}

/// Console logging, plus a daily log file in `file_dir` if given.
///
/// The returned guard flushes the file on drop.
fn init_logging(file_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

async fn record(config: &Config, output_dir: &Path) -> Result<()> {
    info!("Flight Recorder v{} starting...", env!("CARGO_PKG_VERSION"));

    let source = TcpSource::connect(&config.source.address).await?;
    let channels = config.channels()?;
    if config.tick_may_overrun(&channels) {
        warn!(
            "{} reads at up to {:?} each can exceed the {:?} tick period; sampling will slow down when the bridge stalls",
            channels.len(),
            config.read_timeout(),
            config.tick_period()
        );
    }

    let adapter = TelemetryAdapter::new(source, config.read_timeout());
    let mut recorder = Recorder::new(channels, config.session_settings(), adapter);

    info!("Press Ctrl+C to stop recording");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = run(&mut recorder, &config.run_options(), shutdown).await?;
    if summary.reason == StopReason::AutoEnd {
        info!("Recording ended automatically");
    }

    let path = output_dir.join(default_file_name(&Local::now()));
    let report = recorder.export(&path)?;
    for diagnostic in summary.cleaning.diagnostics.iter().chain(&report.diagnostics) {
        warn!("{}", diagnostic);
    }
    info!(
        "Saved {} ticks ({} fields) to {}",
        summary.ticks,
        report.fields,
        report.path.display()
    );

    Ok(())
}

async fn replay(config: &Config, file: &Path) -> Result<()> {
    let document = load_document(file)
        .with_context(|| format!("Failed to load session {}", file.display()))?;

    let channels = document_channels(&document);
    if !document.contains_key(&config.recorder.ground_channel) {
        warn!(
            "{} was not recorded, no phase changes can be detected",
            config.recorder.ground_channel
        );
    }

    let adapter = TelemetryAdapter::new(ReplaySource::new(document), config.read_timeout());
    let mut recorder = Recorder::new(channels, config.session_settings(), adapter);

    let events = recorder.replay_all().await?;
    if events.is_empty() {
        println!("No takeoff or landing found");
    }
    for found in &events {
        println!("{:>10.2}s  {}", found.elapsed, found.event);
    }
    println!("Final phase: {}", recorder.phase());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from(["flight-recorder", "record", "--output-dir", "/tmp/x"]).unwrap();
        match cli.command {
            Commands::Record { config, output_dir } => {
                assert!(config.is_none());
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/x")));
            }
            Commands::Replay { .. } => panic!("expected record"),
        }
    }

    #[test]
    fn test_parse_replay_requires_file() {
        assert!(Cli::try_parse_from(["flight-recorder", "replay"]).is_err());
        assert!(Cli::try_parse_from(["flight-recorder", "replay", "a.json"]).is_ok());
    }

    #[test]
    fn test_load_config_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.recorder.tick_rate_hz, 4);
    }
}
