//! Poll the watched root and process completed runs one at a time

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::time::MissedTickBehavior;

use crate::config::WatchConfig;
use crate::pipeline::process_run;
use crate::platform::Platform;
use crate::run::files::plan_attachments;
use crate::run::marker::pending_runs;
use crate::run::receipt::Receipt;
use crate::run::RunDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub processed: usize,
    pub failed: usize,
}

pub struct Watcher<P> {
    platform: P,
    root: PathBuf,
    marker_suffix: String,
    interval: Duration,
    dry_run: bool,
}

impl<P: Platform> Watcher<P> {
    pub fn new(platform: P, config: &WatchConfig, dry_run: bool) -> Watcher<P> {
        Watcher {
            platform,
            root: config.root.clone(),
            marker_suffix: config.marker_suffix.clone(),
            interval: config.interval,
            dry_run,
        }
    }

    /// Scan once and process every pending run
    ///
    /// A failing run is logged and recorded in its receipt, it doesn't stop the other runs.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();
        let pending = pending_runs(&self.root, &self.marker_suffix)?;
        if pending.is_empty() {
            return Ok(summary);
        }
        info!("{} completed run(s) waiting for upload", pending.len());

        for run in pending {
            summary.processed += 1;
            let ok = if self.dry_run {
                self.plan(&run)
            } else {
                self.process(&run).await
            };
            if !ok {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }

    /// Poll on a fixed interval until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        info!("Watching {} for *{} files...", self.root.display(), self.marker_suffix);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(summary) if summary.processed > 0 => {
                            info!("Poll finished: {} processed, {} failed", summary.processed, summary.failed)
                        }
                        Ok(_) => {}
                        Err(err) => error!("Poll failed: {err:#}"),
                    }
                }
                _ = &mut shutdown => {
                    info!("Interrupted, stopping watcher");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&self, run: &RunDir) -> bool {
        info!("Detected {}", run.marker.path.display());
        let report = process_run(&self.platform, run).await;
        match (&report.error, &report.run) {
            (None, Some(resolved)) => info!("Run {} ({} remote run {}) complete: {} uploaded, {} linked, {} without sample",
                run.name, resolved.resolution, resolved.remote.id, report.uploaded.len(), report.linked.len(),
                report.unmatched.len()),
            (None, None) => info!("Run {} complete", run.name),
            (Some(err), _) => error!("Run {} failed: {err:#}", run.name),
        }

        if let Err(err) = Receipt::from_report(run, &report).write(&run.path) {
            // without a receipt the run will be picked up again on the next poll
            error!("Can't record outcome for {}: {err:#}", run.name);
        }
        report.is_success()
    }

    fn plan(&self, run: &RunDir) -> bool {
        info!("--dry-run set, not uploading {}", run.name);
        match plan_attachments(&run.path) {
            Ok(attachments) => {
                for attachment in attachments {
                    info!("Would upload {:?} {}", attachment.kind, attachment.path.display());
                }
                true
            }
            Err(err) => {
                warn!("Can't list files for {}: {err:#}", run.name);
                false
            }
        }
    }
}
