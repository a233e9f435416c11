//! Watch a directory for completed sequencing runs and upload their BAM files and MultiQC reports
//! to the platform, then link each BAM to the sample that shares its name.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use crate::config::{Config, Overrides};
use crate::platform::http::HttpPlatform;
use crate::platform::Platform;
use crate::watch::Watcher;

/// Load and validate configuration
mod config;
/// Log to stderr and an append-only log file
mod logging;
/// Local run folders: markers, receipts, and files to upload
mod run;
/// Talk to the platform REST API
mod platform;
/// Resolve, upload, and link a single run
mod pipeline;
/// Polling loop
mod watch;

static DEFAULT_CONFIG: &str = "bam-uploader.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Root directory containing run folders
    #[arg(short, long)]
    watch_dir: Option<PathBuf>,
    /// Platform API base URL
    #[arg(long)]
    base_url: Option<String>,
    /// Run folders are complete once a file ending with this suffix appears
    #[arg(long)]
    marker_suffix: Option<String>,
    /// Seconds between directory scans
    #[arg(long)]
    interval: Option<u64>,
    /// Append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Scan the watch directory once and exit
    #[arg(long)]
    once: bool,
    /// Log what would be uploaded without contacting the platform
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_path, required) = match args.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let overrides = Overrides {
        base_url: args.base_url,
        watch_dir: args.watch_dir,
        marker_suffix: args.marker_suffix,
        interval_secs: args.interval,
        log_file: args.log_file,
    };
    let config = Config::load(&config_path, required, overrides)?;

    logging::init(&config.log_file)?;
    info!("bam-uploader {} starting up", env!("CARGO_PKG_VERSION"));
    config.describe();

    let platform = HttpPlatform::new(&config.api)?;
    let watcher = Watcher::new(platform, &config.watch, args.dry_run);
    dispatch(&watcher, args.once).await
}

/// Scan once or keep watching
///
/// With `once` set, any failed run makes the result an error so the process exits non-zero.
async fn dispatch<P: Platform>(watcher: &Watcher<P>, once: bool) -> Result<()> {
    if !once {
        return watcher.run().await;
    }

    let summary = watcher.poll_once().await?;
    info!("Scan finished: {} processed, {} failed", summary.processed, summary.failed);
    if summary.failed > 0 {
        bail!("{} run(s) failed", summary.failed);
    }
    Ok(())
}
