//! Local sequencing run folders
//!
//! A run folder is an immediate subdirectory of the watched root. It becomes ready for upload once
//! a marker file appears inside it, and is marked as handled by a receipt written next to the
//! marker after each processing attempt.

use std::path::PathBuf;

/// List candidate run folders in the watched root
pub mod scan;
/// Detect completion markers and decide which runs are pending
pub mod marker;
/// Record processing outcomes on disk
pub mod receipt;
/// Find BAM and MultiQC files inside a run folder
pub mod files;

/// A completed run folder, ready to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub path: PathBuf,
    /// Folder name, also used as the remote run name
    pub name: String,
    pub marker: Marker,
}

/// The sentinel file that signals a run folder is complete
///
/// The modification time identifies one completion event: touching the marker again starts a new
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub path: PathBuf,
    pub modified_ms: u64,
}
