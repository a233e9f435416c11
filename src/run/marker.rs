use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::run::receipt::{Receipt, RECEIPT_FILE};
use crate::run::scan::list_run_dirs;
use crate::run::{Marker, RunDir};

/// Find the completion marker in a run folder
///
/// The marker is a regular file whose name ends with `suffix`. If several match, the first by
/// name is used so repeated scans agree on which file identifies the completion event.
pub fn find_marker(dir: &Path, suffix: &str) -> Result<Option<Marker>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Can't read run folder {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == RECEIPT_FILE || !name.ends_with(suffix) {
            continue;
        }
        if entry.file_type()?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    match candidates.into_iter().next() {
        Some(path) => {
            let modified = fs::metadata(&path)?.modified()?;
            Ok(Some(Marker { path, modified_ms: epoch_millis(modified) }))
        }
        None => Ok(None),
    }
}

/// Completed runs under `root` that have no receipt for their current completion event
///
/// Problems with a single run folder are logged and that folder is skipped, only an unreadable
/// root fails the scan.
pub fn pending_runs(root: &Path, suffix: &str) -> Result<Vec<RunDir>> {
    let mut pending = Vec::new();
    for path in list_run_dirs(root)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!("Skipping run folder with non UTF-8 name: {}", path.display());
            continue;
        };

        let marker = match find_marker(&path, suffix) {
            Ok(Some(marker)) => marker,
            Ok(None) => {
                debug!("{name} has no marker yet");
                continue;
            }
            Err(err) => {
                warn!("Can't check {} for a marker: {err:#}", path.display());
                continue;
            }
        };

        if let Some(receipt) = Receipt::read(&path) {
            if receipt.marker_mtime_ms == marker.modified_ms {
                debug!("{name} already handled ({})", receipt.outcome);
                continue;
            }
            info!("Marker in {name} changed since the last attempt, processing again");
        }

        pending.push(RunDir { path, name, marker });
    }
    Ok(pending)
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}
