//! FrameSift CLI: probe, analyze, and cut video clips.
//!
//! Usage:
//!   framesift probe <VIDEO>                        Show duration, resolution, frame rate
//!   framesift analyze <VIDEO> [--analyzer motion]  Score frames over time
//!   framesift export <VIDEO> --start S --end S -o OUT
//!                                                  Export a sub-clip
//!   framesift check [--init-config]                Check for ffmpeg/ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framesift_common::config::{config_file_path, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "framesift",
    about = "Find the interesting parts of a video and cut them out",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show video metadata
    Probe {
        /// Path to the video file
        video: PathBuf,
    },

    /// Analyze a video frame by frame
    Analyze {
        /// Path to the video file
        video: PathBuf,

        /// Analyzer to run: motion|human
        #[arg(long, default_value = "motion")]
        analyzer: String,

        /// Seconds between samples (defaults to the configured interval)
        #[arg(long)]
        interval: Option<f64>,

        /// Write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Score above which samples are grouped into highlighted segments
        #[arg(long, default_value = "0.5")]
        threshold: f64,
    },

    /// Export a time range of a video to a new file
    Export {
        /// Path to the video file
        video: PathBuf,

        /// Range start (seconds)
        #[arg(long)]
        start: f64,

        /// Range end (seconds)
        #[arg(long)]
        end: f64,

        /// Output file path; the extension selects the container
        #[arg(short, long)]
        output: PathBuf,

        /// Quality preset: highest|medium|low|passthrough
        #[arg(long)]
        preset: Option<String>,
    },

    /// Check system capabilities
    Check {
        /// Write the effective configuration to the config file if none exists
        #[arg(long)]
        init_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config_file_path);
    let file_config = AppConfig::load_from(&config_path);
    let config = with_cli_overrides(&file_config, cli.verbose);
    framesift_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Probe { video } => commands::probe::run(&config, video).await,
        Commands::Analyze {
            video,
            analyzer,
            interval,
            report,
            threshold,
        } => commands::analyze::run(&config, video, analyzer, interval, report, threshold).await,
        Commands::Export {
            video,
            start,
            end,
            output,
            preset,
        } => commands::export::run(&config, video, start, end, output, preset).await,
        Commands::Check { init_config } => {
            let to_write = init_config.then_some(&file_config);
            commands::check::run(&config, &config_path, to_write).await
        }
    }
}

/// The effective config for this invocation. `file_config` is left as loaded.
fn with_cli_overrides(file_config: &AppConfig, verbose: bool) -> AppConfig {
    let mut config = file_config.clone();
    if verbose {
        config.logging.level = "debug".to_string();
    }
    config
}
