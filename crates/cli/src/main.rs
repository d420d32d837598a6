//! CLI entry point for wav2mp3
//!
//! Parses command line arguments, loads configuration and converts every WAV
//! file in the given directory.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wav2mp3::config::ChannelMode;
use wav2mp3::{Config, RunError, Runner};

/// Exit code for a missing path or a path that is not a directory.
const EXIT_PATH_ERROR: u8 = 2;

/// wav2mp3 - Convert a directory of WAV files to MP3 in parallel
#[derive(Parser, Debug)]
#[command(name = "wav2mp3")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the WAV files to convert
    path: Option<PathBuf>,

    /// Path to an optional configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker thread count (0 = one per logical core)
    #[arg(short, long)]
    workers: Option<u32>,

    /// LAME quality, 0 (best) to 9 (fastest)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Channel mode: auto, mono, stereo or joint-stereo
    #[arg(long)]
    mode: Option<ChannelMode>,

    /// Print the run report as JSON instead of text
    #[arg(long, default_value = "false")]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file (or defaults), then environment, then command line flags
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env(),
    };

    if let Some(workers) = args.workers {
        config.workers.count = workers;
    }
    if let Some(quality) = args.quality {
        config.encoder.quality = quality;
    }
    if let Some(mode) = args.mode {
        config.encoder.mode = mode;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // No directory given: show usage, nothing to convert
    let Some(dir) = args.path.clone() else {
        if let Err(e) = Args::command().print_help() {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    };

    init_tracing();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner = match Runner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing conversions already in progress");
            cancel.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || runner.run(&dir)).await;

    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(RunError::Probe(e))) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_PATH_ERROR);
        }
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(error = %e, "conversion task aborted");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", report.render_text());
    }

    if report.cancelled {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
