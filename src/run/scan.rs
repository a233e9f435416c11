use std::{fs, io};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Immediate, non-hidden subdirectories of the watched root, sorted by name
pub fn list_run_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = fs::read_dir(root)
        .with_context(|| format!("Can't read watch directory {}", root.display()))?
        .map(|res| res.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, io::Error>>()?;

    dirs.retain(|path| path.is_dir() && !is_hidden(path));
    dirs.sort();
    Ok(dirs)
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with('.'))
}
