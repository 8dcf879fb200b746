use anyhow::{Context, Result};
use repairfix_core::BackupRecord;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::fs_utils::{
    copy_file_preserving_mtime, is_empty_dir, remove_dir_all_if_exists, remove_file_if_exists,
};
use crate::layout::{is_bookkeeping_path, safe_relative_path, TargetLayout};
use crate::state::{
    read_backup_record, read_install_manifest, remove_backup_record, remove_installed_marker,
};
use crate::{FileFailure, UninstallReport, UninstallStatus};

/// Best-effort reversal of the last install into `target`. Per-file problems
/// are logged and reported; only unreadable or unremovable bookkeeping fails
/// the call. The marker is always removed last.
pub fn uninstall(target: &Path) -> Result<UninstallReport> {
    let layout = TargetLayout::new(target);
    let marker_existed = layout.marker_path().exists();
    let manifest = read_install_manifest(&layout)?;
    let record = read_backup_record(&layout)?;

    let mut report = UninstallReport {
        target: target.to_path_buf(),
        status: UninstallStatus::Uninstalled,
        removed: Vec::new(),
        restored: Vec::new(),
        removed_dirs: Vec::new(),
        failures: Vec::new(),
    };

    if !marker_existed && manifest.is_none() && record.is_none() {
        debug!(target = %target.display(), "nothing installed, skipping uninstall");
        report.status = UninstallStatus::NotInstalled;
        return Ok(report);
    }

    match &manifest {
        Some(manifest) => delete_installed_files(&layout, &manifest.files, &mut report),
        None => warn!(target = %target.display(), "install manifest missing, nothing to delete"),
    }
    remove_emptied_dirs(&layout, &mut report);

    let restore_failed = match &record {
        Some(record) => !restore_originals(&layout, record, &mut report),
        None => {
            warn!(target = %target.display(), "backup record missing, nothing to restore");
            false
        }
    };

    // The backup copies are the only remaining originals until every restore succeeded;
    // keeping the record lets a later uninstall retry.
    if restore_failed {
        warn!(target = %target.display(), "keeping backups because some originals were not restored");
    } else {
        let backup_dir = layout.backup_dir();
        if let Err(err) = remove_dir_all_if_exists(&backup_dir) {
            warn!(dir = %backup_dir.display(), "failed to remove backup dir: {err}");
            report.failures.push(FileFailure {
                path: backup_dir.display().to_string(),
                reason: err.to_string(),
            });
        }
        remove_backup_record(&layout)?;
    }
    let manifest_path = layout.manifest_path();
    remove_file_if_exists(&manifest_path)
        .with_context(|| format!("failed to remove install manifest: {}", manifest_path.display()))?;
    remove_installed_marker(&layout)?;

    info!(
        target = %target.display(),
        removed = report.removed.len(),
        restored = report.restored.len(),
        failures = report.failures.len(),
        "uninstall complete"
    );
    Ok(report)
}

fn delete_installed_files(layout: &TargetLayout, files: &[String], report: &mut UninstallReport) {
    for rel in files {
        if is_bookkeeping_path(rel) {
            warn!(file = %rel, "refusing to delete bookkeeping path listed in manifest");
            continue;
        }
        let path = match layout.target_path(rel) {
            Ok(path) => path,
            Err(err) => {
                warn!(file = %rel, "skipping manifest entry: {err:#}");
                continue;
            }
        };
        match fs::symlink_metadata(&path) {
            Err(_) => {
                debug!(file = %rel, "already gone");
            }
            Ok(metadata) if metadata.is_dir() => {
                debug!(file = %rel, "manifest entry is a directory, left in place");
            }
            Ok(_) => match fs::remove_file(&path) {
                Ok(()) => report.removed.push(rel.clone()),
                Err(err) => {
                    warn!(file = %rel, "failed to delete installed file: {err}");
                    report.failures.push(FileFailure {
                        path: rel.clone(),
                        reason: err.to_string(),
                    });
                }
            },
        }
    }
}

/// Removes every parent directory of a deleted file that is now empty,
/// deepest first, never the target itself.
fn remove_emptied_dirs(layout: &TargetLayout, report: &mut UninstallReport) {
    let mut candidates = BTreeSet::new();
    for rel in &report.removed {
        let mut parent = Path::new(rel).parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            candidates.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }

    let mut ordered = candidates.into_iter().collect::<Vec<PathBuf>>();
    ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    for rel in ordered {
        let path = layout.root().join(&rel);
        if !is_empty_dir(&path) {
            continue;
        }
        let rel = rel
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        match fs::remove_dir(&path) {
            Ok(()) => report.removed_dirs.push(rel),
            Err(err) => warn!(dir = %rel, "failed to remove empty directory: {err}"),
        }
    }
}

/// Returns false when any backup copy could not be put back.
fn restore_originals(layout: &TargetLayout, record: &BackupRecord, report: &mut UninstallReport) -> bool {
    let mut all_restored = true;
    let backup_dir = resolve_backup_dir(layout, record);
    for original in &record.original_files {
        if original.is_directory() || is_bookkeeping_path(&original.path) {
            continue;
        }
        let rel = match safe_relative_path(&original.path) {
            Ok(rel) => rel,
            Err(err) => {
                warn!(file = %original.path, "skipping backup entry: {err:#}");
                continue;
            }
        };
        let copy = backup_dir.join(&rel);
        if !copy.is_file() {
            debug!(file = %original.path, "no backup copy, nothing to restore");
            continue;
        }
        match copy_file_preserving_mtime(&copy, &layout.root().join(&rel)) {
            Ok(()) => report.restored.push(original.path.clone()),
            Err(err) => {
                warn!(file = %original.path, "failed to restore original: {err:#}");
                all_restored = false;
                report.failures.push(FileFailure {
                    path: original.path.clone(),
                    reason: format!("{err:#}"),
                });
            }
        }
    }
    all_restored
}

/// Uses the recorded directory only while it still lies inside the target;
/// records written on another machine or before the target moved fall back to
/// the standard location.
fn resolve_backup_dir(layout: &TargetLayout, record: &BackupRecord) -> PathBuf {
    let recorded = PathBuf::from(&record.backup_dir);
    let recorded = if recorded.is_absolute() {
        recorded
    } else {
        layout.root().join(recorded)
    };
    let escapes = recorded
        .components()
        .any(|component| matches!(component, Component::ParentDir));
    if !escapes && recorded.starts_with(layout.root()) && recorded.is_dir() {
        recorded
    } else {
        layout.backup_dir()
    }
}
