//! fitloop CLI: synthetic demo runs through the orchestrator and checkpoint
//! inspection.

mod commands;
mod demo;

use clap::Parser;
use fitloop_core::{ConfigOverrides, Device};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// fitloop: resumable train/evaluate loops for classifiers
#[derive(Parser, Debug)]
#[command(name = "fitloop", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.fitloop/config.toml` from here)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train a softmax-regression classifier on seeded synthetic blobs
    Train(TrainArgs),
    /// Print the metric history stored in a checkpoint directory
    Inspect {
        /// Checkpoint directory
        dir: PathBuf,
        /// Print the raw metric record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default `.fitloop/config.toml` into the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[derive(clap::Args, Debug, Clone)]
struct TrainArgs {
    /// Extra TOML file layered above environment variables, below flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Total epochs, including any already in the checkpoint
    #[arg(long)]
    epochs: Option<usize>,

    /// Stop after this many epochs without a validation improvement
    #[arg(long)]
    patience: Option<usize>,

    /// Save and resume from this directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Write loss/accuracy SVG plots next to the checkpoint
    #[arg(long)]
    plot: bool,

    /// Report summed loss instead of the per-sample mean
    #[arg(long)]
    raw_loss: bool,

    /// Device: cpu, cuda, cuda:N, metal
    #[arg(long)]
    device: Option<Device>,

    /// Use the train/validation/test loop with early stopping
    #[arg(long)]
    validation: bool,

    /// Feed per-sample offsets to the coordinate-aware model
    #[arg(long)]
    coords: bool,

    /// Dataset seed
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Number of generated samples before the 70/15/15 split
    #[arg(long, default_value_t = 600)]
    samples: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.5)]
    lr: f64,

    /// Decay the learning rate every N epochs
    #[arg(long, default_value_t = 5)]
    lr_step: usize,

    /// Learning-rate decay factor
    #[arg(long, default_value_t = 0.5)]
    lr_gamma: f64,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl TrainArgs {
    /// Overrides from `--config` first, then individual flags on top.
    fn overrides(&self) -> anyhow::Result<ConfigOverrides> {
        let mut overrides = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
                toml::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
            }
            None => ConfigOverrides::default(),
        };
        if let Some(epochs) = self.epochs {
            overrides.epochs = Some(epochs);
        }
        if let Some(patience) = self.patience {
            overrides.patience = Some(patience);
        }
        if let Some(dir) = &self.checkpoint_dir {
            overrides.checkpoint_dir = Some(dir.clone());
        }
        if let Some(device) = self.device {
            overrides.device = Some(device);
        }
        if self.plot {
            overrides.plot = Some(true);
        }
        if self.raw_loss {
            overrides.normalise_loss = Some(false);
        }
        Ok(overrides)
    }
}

/// Directory for the rolling JSON log files.
fn log_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "fitloop", "fitloop")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Non-blocking writer for the daily JSON log under `dir`.
fn file_writer(dir: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("fitloop.log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = log_dir();
    let (json_layer, _guard, log_error) = match file_writer(&log_dir) {
        Ok((writer, guard)) => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    if let Some(e) = log_error {
        tracing::warn!(
            dir = %log_dir.display(),
            error = %e,
            "Could not open log directory; file logging is disabled"
        );
    }

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace)
}
