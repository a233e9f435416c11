use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::pipeline::RunReport;
use crate::run::RunDir;

/// Receipt file name inside each processed run folder
pub static RECEIPT_FILE: &str = ".bam-uploader.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Complete,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Complete => write!(f, "complete"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedSample {
    pub bam: String,
    pub attachment_id: String,
    pub sample: String,
    pub sample_id: String,
}

/// Outcome of one completion event, written as JSON next to the marker
///
/// `marker_mtime_ms` ties the receipt to the marker it was written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub run: String,
    pub remote_id: Option<String>,
    pub outcome: Outcome,
    pub marker_mtime_ms: u64,
    pub processed_at: DateTime<Utc>,
    pub uploaded: Vec<String>,
    pub linked: Vec<LinkedSample>,
    pub unmatched: Vec<String>,
    pub error: Option<String>,
}

impl Receipt {
    pub fn from_report(run: &RunDir, report: &RunReport) -> Receipt {
        Receipt {
            run: run.name.clone(),
            remote_id: report.run.as_ref().map(|r| r.remote.id.to_string()),
            outcome: if report.error.is_none() { Outcome::Complete } else { Outcome::Failed },
            marker_mtime_ms: run.marker.modified_ms,
            processed_at: Utc::now(),
            uploaded: report.uploaded.iter().map(|u| u.attachment.file_name()).collect(),
            linked: report.linked.iter()
                .map(|link| LinkedSample {
                    bam: link.bam.clone(),
                    attachment_id: link.attachment_id.to_string(),
                    sample: link.sample.name.clone(),
                    sample_id: link.sample.id.to_string(),
                })
                .collect(),
            unmatched: report.unmatched.clone(),
            error: report.error.as_ref().map(|err| format!("{err:#}")),
        }
    }

    /// Read the receipt in a run folder
    ///
    /// An unreadable or malformed receipt is treated as missing, so the run is processed again.
    pub fn read(dir: &Path) -> Option<Receipt> {
        let path = dir.join(RECEIPT_FILE);
        if !path.exists() {
            return None;
        }
        let parsed = fs::read_to_string(&path)
            .context("read")
            .and_then(|text| serde_json::from_str::<Receipt>(&text).context("parse"));
        match parsed {
            Ok(receipt) => Some(receipt),
            Err(err) => {
                warn!("Ignoring unusable receipt {} ({err:#})", path.display());
                None
            }
        }
    }

    /// Write the receipt, replacing any older one in a single rename
    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(RECEIPT_FILE);
        let tmp = dir.join(format!("{RECEIPT_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json).with_context(|| format!("Can't write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Can't move receipt into place at {}", path.display()))?;
        info!("Wrote {} receipt to {}", self.outcome, path.display());
        Ok(())
    }
}
