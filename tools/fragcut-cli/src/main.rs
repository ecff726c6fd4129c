//! Fragcut CLI: Headless front end for the processing pipeline.
//!
//! Usage:
//!   fragcut process <JOB.json>   Render a job and publish the MP4
//!   fragcut plan <JOB.json>      Show the render plan without encoding
//!   fragcut probe <VIDEO>        Show what ffprobe reports for a file
//!   fragcut check                Check ffmpeg, encoders and caption font
//!   fragcut config               Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fragcut_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "fragcut",
    about = "Trim, reframe and encode gameplay clips with ffmpeg",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a job described by a JSON file
    Process {
        /// Path to the job JSON
        job: PathBuf,

        /// Override the configured output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Override the output file stem
        #[arg(long)]
        stem: Option<String>,
    },

    /// Probe and plan a job without running the encoder
    Plan {
        /// Path to the job JSON
        job: PathBuf,
    },

    /// Probe a video file
    Probe {
        /// Path to the video
        path: PathBuf,
    },

    /// Check external tools and encoders
    Check,

    /// Print the effective configuration and where it is read from
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    fragcut_common::logging::init_logging(&config.logging);
    tracing::debug!(
        path = %fragcut_common::config::config_file_path().display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Process {
            job,
            output_dir,
            stem,
        } => {
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            if let Some(stem) = stem {
                config.output.file_stem = stem;
            }
            commands::process::run(&config, job, cli.json).await
        }
        Commands::Plan { job } => commands::plan::run(&config, job).await,
        Commands::Probe { path } => commands::probe::run(&config, path, cli.json).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
