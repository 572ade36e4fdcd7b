//! CLI module for the DuoLens client
//!
//! Command-line interface definitions and handlers for driving the client
//! core from a terminal.
//!
//! # Commands
//!
//! - `watch` - Stream live telemetry to the terminal
//! - `detect` - Run one inference against the backend
//! - `analytics` - Fetch and print the current analytics snapshot
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Tail the telemetry stream of a local backend
//! duolens watch
//!
//! # Compare both variants on an image
//! duolens detect photo.jpg --model both --conf-threshold 0.4
//!
//! # Generate shell completions
//! duolens completions bash > ~/.bash_completion.d/duolens
//! ```

pub mod analytics;
pub mod completions;
pub mod detect;
pub mod output;
pub mod watch;

pub use completions::handle_completions;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ClientConfig, ConfigError};

/// DuoLens - model-comparison dashboard client
#[derive(Parser, Debug)]
#[command(
    name = "duolens",
    version,
    about = "Client for the DuoLens model-comparison dashboard"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override backend base URL
    #[arg(long, global = true, env = "DUOLENS_BASE_URL")]
    pub base_url: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DUOLENS_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream live telemetry to the terminal
    Watch(WatchArgs),
    /// Run one inference against the backend
    Detect(DetectArgs),
    /// Fetch and print the current analytics snapshot
    Analytics(AnalyticsArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print events as raw JSON instead of formatted lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Image file to run detection on
    pub image: PathBuf,

    /// Which variant(s) to run: yolov5, detr or both
    #[arg(short, long, default_value = "both")]
    pub model: String,

    /// Minimum confidence for returned detections
    #[arg(long, default_value_t = 0.5)]
    pub conf_threshold: f64,

    /// IoU threshold for non-max suppression
    #[arg(long, default_value_t = 0.45)]
    pub iou_threshold: f64,
}

#[derive(Args, Debug)]
pub struct AnalyticsArgs {
    /// Output as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

/// Resolve the effective configuration: file, then env, then CLI flags.
pub fn load_config(cli: &Cli) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::load(cli.config.as_deref())?.with_env_overrides();

    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}
