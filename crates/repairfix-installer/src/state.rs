use anyhow::{Context, Result};
use repairfix_core::{BackupRecord, InstallManifest, InstalledMarker};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fs_utils::remove_file_if_exists;
use crate::layout::TargetLayout;
use crate::types::InstallStatus;

pub fn write_install_manifest(layout: &TargetLayout, manifest: &InstallManifest) -> Result<PathBuf> {
    let path = layout.manifest_path();
    write_state_file(&path, &manifest.to_json_pretty()?, "install manifest")?;
    Ok(path)
}

pub fn read_install_manifest(layout: &TargetLayout) -> Result<Option<InstallManifest>> {
    let path = layout.manifest_path();
    let Some(raw) = read_state_file(&path, "install manifest")? else {
        return Ok(None);
    };
    let manifest = InstallManifest::from_json_str(&raw)
        .with_context(|| format!("failed parsing install manifest: {}", path.display()))?;
    Ok(Some(manifest))
}

pub fn write_backup_record(layout: &TargetLayout, record: &BackupRecord) -> Result<PathBuf> {
    let path = layout.backup_info_path();
    write_state_file(&path, &record.to_json_pretty()?, "backup record")?;
    Ok(path)
}

pub fn read_backup_record(layout: &TargetLayout) -> Result<Option<BackupRecord>> {
    let path = layout.backup_info_path();
    let Some(raw) = read_state_file(&path, "backup record")? else {
        return Ok(None);
    };
    let record = BackupRecord::from_json_str(&raw)
        .with_context(|| format!("failed parsing backup record: {}", path.display()))?;
    Ok(Some(record))
}

pub fn remove_backup_record(layout: &TargetLayout) -> Result<()> {
    let path = layout.backup_info_path();
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to remove backup record: {}", path.display()))
}

pub fn write_installed_marker(layout: &TargetLayout, marker: &InstalledMarker) -> Result<PathBuf> {
    let path = layout.marker_path();
    write_state_file(&path, &marker.to_json_pretty()?, "installed marker")?;
    Ok(path)
}

/// Advisory content only; an unreadable marker still counts as installed.
pub fn read_installed_marker(layout: &TargetLayout) -> Result<Option<InstalledMarker>> {
    let path = layout.marker_path();
    let Some(raw) = read_state_file(&path, "installed marker")? else {
        return Ok(None);
    };
    Ok(InstalledMarker::from_json_str(&raw).ok())
}

pub fn remove_installed_marker(layout: &TargetLayout) -> Result<()> {
    let path = layout.marker_path();
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to remove installed marker: {}", path.display()))
}

pub fn is_installed(target: &Path) -> bool {
    TargetLayout::new(target).marker_path().exists()
}

pub fn read_install_status(target: &Path) -> Result<InstallStatus> {
    let layout = TargetLayout::new(target);
    Ok(InstallStatus {
        target: target.to_path_buf(),
        installed: layout.marker_path().exists(),
        marker: read_installed_marker(&layout)?,
        manifest: read_install_manifest(&layout)?,
        backup: read_backup_record(&layout)?,
    })
}

fn write_state_file(path: &Path, payload: &str, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, payload.as_bytes())
        .with_context(|| format!("failed to write {what}: {}", path.display()))
}

fn read_state_file(path: &Path, what: &str) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read {what}: {}", path.display()))
        }
    }
}
