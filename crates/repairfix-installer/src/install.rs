use anyhow::{Context, Result};
use chrono::Utc;
use repairfix_core::{ArchiveEntry, BackupRecord, InstallManifest, InstalledMarker, OriginalFile};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::InstallError;
use crate::extract::ExtractionEngine;
use crate::fs_utils::{copy_file_preserving_mtime, remove_dir_all_if_exists, remove_file_if_exists};
use crate::layout::{is_bookkeeping_path, TargetLayout};
use crate::probe::ArchiveProbe;
use crate::snapshot::{diff, DirectorySnapshot};
use crate::state::{
    read_backup_record, read_install_manifest, remove_backup_record, write_backup_record,
    write_install_manifest, write_installed_marker,
};
use crate::tools::ToolConfig;
use crate::{CommitMode, Enumeration, InstallOptions, InstallOutcome};

/// Drives one install: backup, extraction, bookkeeping. Callers must not run
/// two transactions against the same target at once.
#[derive(Debug)]
pub struct Installer {
    probe: ArchiveProbe,
    engine: ExtractionEngine,
}

impl Installer {
    pub fn new(tools: ToolConfig) -> Self {
        Self {
            engine: ExtractionEngine::from_tools(&tools),
            probe: ArchiveProbe::new(tools),
        }
    }

    pub fn with_parts(probe: ArchiveProbe, engine: ExtractionEngine) -> Self {
        Self { probe, engine }
    }

    /// Installs `archive` into `target` and returns what was written. On
    /// failure the bookkeeping is left as it was before the call, but files
    /// already written by a failed extraction attempt stay on disk.
    pub fn install(
        &self,
        archive: &Path,
        target: &Path,
        options: InstallOptions<'_>,
    ) -> Result<InstallOutcome> {
        if !archive.is_file() {
            return Err(InstallError::ArchiveNotFound {
                archive: archive.to_path_buf(),
            }
            .into());
        }

        let layout = TargetLayout::new(target);
        layout.ensure_target_dir()?;
        let backup_dir = layout.ensure_backup_dir()?;
        let archive_name = archive_file_name(archive);

        let previous = previous_install_files(&layout);
        let previous_record = previous_backup_record(&layout);
        let provisional = ProvisionalRecord {
            layout: &layout,
            archive_name: &archive_name,
            previous: previous_record.as_ref(),
        };
        let before = DirectorySnapshot::capture(target);
        let entries = self.probe.list_entries(archive);
        debug!(
            target = %target.display(),
            files_before = before.len(),
            entries = entries.len(),
            mode = options.commit_mode.as_str(),
            "starting install"
        );

        let committed = match options.commit_mode {
            CommitMode::Direct if !entries.is_empty() => {
                self.install_from_entries(&provisional, archive, &entries, &previous, options)
            }
            CommitMode::Direct => {
                self.install_with_snapshot_diff(&provisional, archive, &before, options)
            }
            CommitMode::Staged => self.install_staged(&provisional, archive, &previous, options),
        };
        let committed = match committed {
            Ok(committed) => committed,
            Err(err) => {
                provisional.roll_back();
                return Err(err);
            }
        };

        let recorded = carry_forward(&committed.files, &previous);
        let originals = carry_forward(&recorded, &previous_record_paths(previous_record.as_ref()));
        let now = Utc::now();
        write_install_manifest(
            &layout,
            &InstallManifest::new(archive_name.clone(), recorded.clone(), now),
        )?;
        write_backup_record(
            &layout,
            &BackupRecord {
                original_files: originals.iter().map(OriginalFile::file).collect(),
                backup_dir: backup_dir.display().to_string(),
                installed_at: now,
                archive_file_name: archive_name.clone(),
            },
        )?;
        write_installed_marker(&layout, &InstalledMarker::new(now, env!("CARGO_PKG_VERSION")))?;

        info!(
            target = %target.display(),
            archive = %archive_name,
            files = committed.files.len(),
            backed_up = committed.backed_up.len(),
            strategy = %committed.strategy,
            "install complete"
        );

        Ok(InstallOutcome {
            target: target.to_path_buf(),
            archive_name,
            files: committed.files,
            backed_up: committed.backed_up,
            strategy: committed.strategy,
            enumeration: committed.enumeration,
        })
    }

    fn install_from_entries(
        &self,
        provisional: &ProvisionalRecord<'_>,
        archive: &Path,
        entries: &[ArchiveEntry],
        previous: &[String],
        options: InstallOptions<'_>,
    ) -> Result<Committed> {
        let layout = provisional.layout;
        let mut files = Vec::new();
        let mut backed_up = Vec::new();
        let mut seen = HashSet::new();

        for entry in entries.iter().filter(|entry| !entry.is_directory) {
            if is_bookkeeping_path(&entry.name) {
                warn!(entry = %entry.name, "archive entry collides with install bookkeeping, not tracked");
                continue;
            }
            let destination = match layout.target_path(&entry.name) {
                Ok(destination) => destination,
                Err(err) => {
                    warn!(entry = %entry.name, "skipping archive entry: {err:#}");
                    continue;
                }
            };
            if !seen.insert(entry.name.clone()) {
                continue;
            }
            if destination.is_file() && !previous.contains(&entry.name) {
                match backup_original(layout, &entry.name, &destination) {
                    Ok(()) => backed_up.push(entry.name.clone()),
                    Err(err) => warn!(file = %entry.name, "failed to back up original: {err:#}"),
                }
            }
            files.push(entry.name.clone());
        }

        provisional.write(&backed_up)?;
        let strategy = self.engine.extract(archive, layout.root(), options.password)?;

        Ok(Committed {
            files,
            backed_up,
            strategy,
            enumeration: Enumeration::Entries,
        })
    }

    fn install_with_snapshot_diff(
        &self,
        provisional: &ProvisionalRecord<'_>,
        archive: &Path,
        before: &DirectorySnapshot,
        options: InstallOptions<'_>,
    ) -> Result<Committed> {
        let layout = provisional.layout;
        provisional.write(&[])?;
        let strategy = self.engine.extract(archive, layout.root(), options.password)?;

        let after = DirectorySnapshot::capture(layout.root());
        let files = diff(before, &after)
            .into_iter()
            .filter(|rel| !is_bookkeeping_path(rel))
            .collect();

        Ok(Committed {
            files,
            backed_up: Vec::new(),
            strategy,
            enumeration: Enumeration::SnapshotDiff,
        })
    }

    fn install_staged(
        &self,
        provisional: &ProvisionalRecord<'_>,
        archive: &Path,
        previous: &[String],
        options: InstallOptions<'_>,
    ) -> Result<Committed> {
        let layout = provisional.layout;
        let staging = layout.staging_dir();
        remove_dir_all_if_exists(&staging)
            .with_context(|| format!("failed to clear staging dir: {}", staging.display()))?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;

        let result = self.commit_staged(provisional, archive, &staging, previous, options);
        if let Err(err) = remove_dir_all_if_exists(&staging) {
            warn!(staging = %staging.display(), "failed to remove staging dir: {err}");
        }
        result
    }

    fn commit_staged(
        &self,
        provisional: &ProvisionalRecord<'_>,
        archive: &Path,
        staging: &Path,
        previous: &[String],
        options: InstallOptions<'_>,
    ) -> Result<Committed> {
        let layout = provisional.layout;
        let strategy = self.engine.extract(archive, staging, options.password)?;

        let files = DirectorySnapshot::capture(staging)
            .paths()
            .into_iter()
            .filter(|rel| {
                let tracked = !is_bookkeeping_path(rel);
                if !tracked {
                    warn!(entry = %rel, "staged file collides with install bookkeeping, skipped");
                }
                tracked
            })
            .collect::<Vec<_>>();

        let mut backed_up = Vec::new();
        let mut preexisting = HashSet::new();
        for rel in &files {
            let destination = layout.target_path(rel)?;
            if destination.is_file() && !previous.contains(rel) {
                preexisting.insert(rel.clone());
                match backup_original(layout, rel, &destination) {
                    Ok(()) => backed_up.push(rel.clone()),
                    Err(err) => warn!(file = %rel, "failed to back up original: {err:#}"),
                }
            }
        }
        provisional.write(&backed_up)?;

        for (index, rel) in files.iter().enumerate() {
            if let Err(err) = place_staged_file(layout, staging, rel) {
                // The failing file may already be truncated, so it is rolled back too.
                undo_placed_files(layout, &files[..=index], &preexisting, previous);
                return Err(err);
            }
        }

        Ok(Committed {
            files,
            backed_up,
            strategy,
            enumeration: Enumeration::StagedTree,
        })
    }
}

struct Committed {
    files: Vec<String>,
    backed_up: Vec<String>,
    strategy: String,
    enumeration: Enumeration,
}

/// Files recorded by an earlier install into the same target. They are not
/// originals, so they are never backed up again, and they stay in the new
/// manifest so one uninstall reverses every install.
fn previous_install_files(layout: &TargetLayout) -> Vec<String> {
    match read_install_manifest(layout) {
        Ok(Some(manifest)) => manifest.files,
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(target = %layout.root().display(), "ignoring unreadable install manifest: {err:#}");
            Vec::new()
        }
    }
}

fn carry_forward(files: &[String], previous: &[String]) -> Vec<String> {
    let mut recorded = files.to_vec();
    let mut seen = files.iter().cloned().collect::<HashSet<_>>();
    for rel in previous {
        if seen.insert(rel.clone()) {
            recorded.push(rel.clone());
        }
    }
    recorded
}

/// An existing backup copy is never replaced, so the content from before the
/// first install survives reinstalls.
fn backup_original(layout: &TargetLayout, rel: &str, original: &Path) -> Result<()> {
    let copy = layout.backup_copy_path(rel)?;
    if copy.exists() {
        debug!(file = %rel, "keeping earlier backup copy");
        return Ok(());
    }
    copy_file_preserving_mtime(original, &copy)
}

fn previous_backup_record(layout: &TargetLayout) -> Option<BackupRecord> {
    match read_backup_record(layout) {
        Ok(record) => record,
        Err(err) => {
            warn!(target = %layout.root().display(), "ignoring unreadable backup record: {err:#}");
            None
        }
    }
}

fn previous_record_paths(record: Option<&BackupRecord>) -> Vec<String> {
    record
        .map(|record| {
            record
                .original_files
                .iter()
                .map(|original| original.path.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// The backup record written before files are touched. It keeps every
/// original the earlier install recorded, and a failed attempt puts the
/// earlier record back.
struct ProvisionalRecord<'a> {
    layout: &'a TargetLayout,
    archive_name: &'a str,
    previous: Option<&'a BackupRecord>,
}

impl ProvisionalRecord<'_> {
    fn write(&self, backed_up: &[String]) -> Result<()> {
        let originals = carry_forward(backed_up, &previous_record_paths(self.previous));
        write_backup_record(
            self.layout,
            &BackupRecord {
                original_files: originals.iter().map(OriginalFile::file).collect(),
                backup_dir: self.layout.backup_dir().display().to_string(),
                installed_at: Utc::now(),
                archive_file_name: self.archive_name.to_string(),
            },
        )?;
        Ok(())
    }

    fn roll_back(&self) {
        let result = match self.previous {
            Some(record) => write_backup_record(self.layout, record).map(|_| ()),
            None => remove_backup_record(self.layout),
        };
        if let Err(err) = result {
            warn!(target = %self.layout.root().display(), "failed to roll back backup record: {err:#}");
        }
    }
}

fn place_staged_file(layout: &TargetLayout, staging: &Path, rel: &str) -> Result<()> {
    let source = staging.join(rel);
    let destination = layout.target_path(rel)?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::copy(&source, &destination).with_context(|| {
        format!(
            "failed to copy staged {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(())
}

/// Reverts files copied out of staging: originals come back from their
/// backup copies and new files are deleted. Files owned by an earlier install
/// stay, since the earlier manifest still tracks them.
fn undo_placed_files(
    layout: &TargetLayout,
    placed: &[String],
    preexisting: &HashSet<String>,
    previous: &[String],
) {
    for rel in placed {
        if previous.contains(rel) {
            continue;
        }
        let result = layout.target_path(rel).and_then(|destination| {
            if preexisting.contains(rel) {
                let copy = layout.backup_copy_path(rel)?;
                if copy.is_file() {
                    copy_file_preserving_mtime(&copy, &destination)?;
                }
                Ok(())
            } else if destination.is_file() {
                remove_file_if_exists(&destination)
                    .with_context(|| format!("failed to remove {}", destination.display()))
            } else {
                Ok(())
            }
        });
        if let Err(err) = result {
            warn!(file = %rel, "failed to undo staged copy: {err:#}");
        }
    }
}

fn archive_file_name(archive: &Path) -> String {
    archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string())
}
