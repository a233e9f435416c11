use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use zip::ZipArchive;

/// BAM files are read from `<run>/bam`
pub static BAM_DIR: &str = "bam";
/// Optional MultiQC reports are read from `<run>/multiqc`
pub static MULTIQC_DIR: &str = "multiqc";
/// Zipped reports are unpacked into `<run>/multiqc/extracted/<archive path>/`
pub static EXTRACTED_DIR: &str = "extracted";

static BAM_EXTENSION: &str = ".bam";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Bam,
    MultiQc,
}

/// A local file that will be attached to the remote run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub kind: AttachmentKind,
}

impl Attachment {
    pub fn file_name(&self) -> String {
        self.path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned())
    }
}

/// Collect every file to upload for a run: BAMs first, then MultiQC reports
///
/// Zip archives in the MultiQC folder are extracted and their members replace the archive.
pub fn collect_attachments(run_path: &Path) -> Result<Vec<Attachment>> {
    gather(run_path, Archives::Extract)
}

/// The attachments [`collect_attachments`] would return, without writing anything
///
/// Zip members are read from the archive directory and reported at the path they would be
/// extracted to.
pub fn plan_attachments(run_path: &Path) -> Result<Vec<Attachment>> {
    gather(run_path, Archives::List)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Archives {
    Extract,
    List,
}

fn gather(run_path: &Path, archives: Archives) -> Result<Vec<Attachment>> {
    let bam_dir = run_path.join(BAM_DIR);
    let bams = if bam_dir.is_dir() {
        collect_bams(&bam_dir)?
    } else {
        warn!("No {BAM_DIR} directory in {}", run_path.display());
        Vec::new()
    };

    let multiqc_dir = run_path.join(MULTIQC_DIR);
    let reports = if multiqc_dir.is_dir() {
        collect_reports(&multiqc_dir, archives)?
    } else {
        info!("No {MULTIQC_DIR} directory in {}, skipping reports", run_path.display());
        Vec::new()
    };

    let attachments = bams.into_iter()
        .map(|path| Attachment { path, kind: AttachmentKind::Bam })
        .chain(reports.into_iter().map(|path| Attachment { path, kind: AttachmentKind::MultiQc }))
        .collect();
    Ok(attachments)
}

/// Sample name for a BAM: the file name with the trailing `.bam` removed
pub fn bam_base_name(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(BAM_EXTENSION).filter(|base| !base.is_empty())
}

fn collect_bams(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut bams: Vec<PathBuf> = list_dir(dir)?
        .into_iter()
        .filter(|path| path.is_file() && bam_base_name(path).is_some())
        .collect();
    bams.sort();
    Ok(bams)
}

fn collect_reports(multiqc_dir: &Path, mode: Archives) -> Result<Vec<PathBuf>> {
    let extracted_root = multiqc_dir.join(EXTRACTED_DIR);
    let mut archives = Vec::new();
    let mut reports = Vec::new();
    walk(multiqc_dir, &extracted_root, &mut reports, &mut archives)?;
    reports.sort();
    archives.sort();

    if mode == Archives::Extract && extracted_root.exists() {
        warn!("Removing previous extraction in {}", extracted_root.display());
        fs::remove_dir_all(&extracted_root)?;
    }

    for archive in archives {
        let out_dir = extraction_dir(multiqc_dir, &archive);
        let mut members = match mode {
            Archives::Extract => extract_zip(&archive, &out_dir)?,
            Archives::List => list_zip(&archive, &out_dir)?,
        };
        members.sort();
        reports.extend(members);
    }
    Ok(reports)
}

/// `multiqc/laneA/data.zip` unpacks into `multiqc/extracted/laneA/data.zip/`
///
/// The archive's own relative path names the folder, so two archives never share one.
fn extraction_dir(multiqc_dir: &Path, archive: &Path) -> PathBuf {
    let relative = archive.strip_prefix(multiqc_dir)
        .unwrap_or_else(|_| Path::new(archive.file_name().unwrap_or_default()));
    multiqc_dir.join(EXTRACTED_DIR).join(relative)
}

/// Recursively gather report files, setting zip archives aside and skipping our own output dir
fn walk(dir: &Path, skip: &Path, files: &mut Vec<PathBuf>, archives: &mut Vec<PathBuf>) -> Result<()> {
    for path in list_dir(dir)? {
        if path == skip {
            continue;
        }
        if path.is_dir() {
            walk(&path, skip, files, archives)?;
        } else if is_zip(&path) {
            archives.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn is_zip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("zip"))
}

fn open_zip(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path).with_context(|| format!("Can't open {}", archive_path.display()))?;
    ZipArchive::new(file).with_context(|| format!("Invalid zip archive {}", archive_path.display()))
}

/// Extract a zip archive into `out_dir`, returning the extracted file paths
///
/// Entries that would escape `out_dir` are skipped.
pub fn extract_zip(archive_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Extracting {} to {}", archive_path.display(), out_dir.display());
    let mut archive = open_zip(archive_path)?;
    fs::create_dir_all(out_dir)?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping unsafe path {} in {}", entry.name(), archive_path.display());
            continue;
        };
        let out_path = out_dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path).with_context(|| format!("Can't create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(out_path);
    }
    Ok(extracted)
}

/// Paths [`extract_zip`] would write for an archive, without touching the disk
pub fn list_zip(archive_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open_zip(archive_path)?;
    let mut members = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        match entry.enclosed_name() {
            Some(relative) => members.push(out_dir.join(relative)),
            None => warn!("Skipping unsafe path {} in {}", entry.name(), archive_path.display()),
        }
    }
    Ok(members)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(dir)
        .with_context(|| format!("Can't read {}", dir.display()))?
        .map(|res| res.map(|e| e.path()).map_err(anyhow::Error::from))
        .collect()
}
