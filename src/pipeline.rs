//! Process one completed run: resolve the remote run, upload attachments, link BAMs to samples
//!
//! Steps happen strictly in order and the first error stops the run. Linking is only attempted
//! once every attachment uploaded, so a partly uploaded run never gets sample links.

use std::fmt;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::platform::model::{PlatformId, RemoteRun, RemoteSample};
use crate::platform::Platform;
use crate::run::files::{bam_base_name, collect_attachments, Attachment, AttachmentKind};
use crate::run::RunDir;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Existing,
    Created,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Resolution::Existing => write!(f, "existing"),
            Resolution::Created => write!(f, "created"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedRun {
    pub remote: RemoteRun,
    pub resolution: Resolution,
}

#[derive(Clone, Debug)]
pub struct UploadedAttachment {
    pub attachment: Attachment,
    pub remote_id: PlatformId,
}

#[derive(Clone, Debug)]
pub struct SampleLink {
    /// BAM file name
    pub bam: String,
    pub attachment_id: PlatformId,
    pub sample: RemoteSample,
}

/// Everything that happened while processing a run, including how far it got before an error
#[derive(Debug, Default)]
pub struct RunReport {
    pub run: Option<ResolvedRun>,
    pub uploaded: Vec<UploadedAttachment>,
    pub linked: Vec<SampleLink>,
    /// BAM file names with no sample of the same base name
    pub unmatched: Vec<String>,
    pub error: Option<anyhow::Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Find the remote run named after the folder, creating it when the platform has none
pub async fn resolve_run<P: Platform>(platform: &P, name: &str) -> Result<ResolvedRun> {
    match platform.find_run(name).await.with_context(|| format!("Looking up run {name}"))? {
        Some(remote) => {
            info!("Found existing run {name} (ID {})", remote.id);
            Ok(ResolvedRun { remote, resolution: Resolution::Existing })
        }
        None => {
            let remote = platform.create_run(name).await.with_context(|| format!("Creating run {name}"))?;
            info!("Created run {name} (ID {})", remote.id);
            Ok(ResolvedRun { remote, resolution: Resolution::Created })
        }
    }
}

pub async fn process_run<P: Platform>(platform: &P, run: &RunDir) -> RunReport {
    let mut report = RunReport::default();
    if let Err(err) = try_process(platform, run, &mut report).await {
        report.error = Some(err);
    }
    report
}

async fn try_process<P: Platform>(platform: &P, run: &RunDir, report: &mut RunReport) -> Result<()> {
    // local work first, so a broken folder never creates a remote run
    let attachments = collect_attachments(&run.path)?;
    if attachments.is_empty() {
        warn!("Run {} has no files to upload", run.name);
    }

    let resolved = resolve_run(platform, &run.name).await?;
    let run_id = resolved.remote.id.clone();
    report.run = Some(resolved);

    for attachment in attachments {
        let remote = platform.upload_attachment(&run_id, &attachment.path).await
            .with_context(|| format!("Uploading {}", attachment.path.display()))?;
        info!("Uploaded {} as attachment {}", attachment.file_name(), remote.id);
        report.uploaded.push(UploadedAttachment { attachment, remote_id: remote.id });
    }

    link_samples(platform, report).await
}

async fn link_samples<P: Platform>(platform: &P, report: &mut RunReport) -> Result<()> {
    let bams: Vec<(String, String, PlatformId)> = report.uploaded.iter()
        .filter(|u| u.attachment.kind == AttachmentKind::Bam)
        .filter_map(|u| {
            let base = bam_base_name(&u.attachment.path)?.to_string();
            Some((u.attachment.file_name(), base, u.remote_id.clone()))
        })
        .collect();

    for (bam, base, attachment_id) in bams {
        let Some(sample) = platform.find_sample(&base).await.with_context(|| format!("Looking up sample {base}"))? else {
            warn!("No sample named {base}, {bam} stays unlinked");
            report.unmatched.push(bam);
            continue;
        };
        platform.link_sample(&sample.id, &attachment_id).await
            .with_context(|| format!("Linking {bam} to sample {base}"))?;
        info!("Linked {bam} to sample {} (ID {})", sample.name, sample.id);
        report.linked.push(SampleLink { bam, attachment_id, sample });
    }
    Ok(())
}
