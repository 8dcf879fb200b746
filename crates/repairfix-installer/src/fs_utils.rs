use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io;
use std::path::Path;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Copies `src` to `dst`, creating parents and carrying the modification time over.
pub fn copy_file_preserving_mtime(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;

    // Read-only originals copy as read-only, so no writable handle is opened here.
    let metadata =
        fs::metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))
        .with_context(|| format!("failed to set modification time on {}", dst.display()))?;
    Ok(())
}

pub fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
