use repairfix_core::{BackupRecord, InstallManifest, InstalledMarker};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Extract straight into the target directory.
    #[default]
    Direct,
    /// Extract into a staging directory, then copy into place.
    Staged,
}

impl CommitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Staged => "staged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallOptions<'a> {
    pub password: Option<&'a str>,
    pub commit_mode: CommitMode,
}

/// How the changed-file list of an install was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enumeration {
    Entries,
    SnapshotDiff,
    StagedTree,
}

impl Enumeration {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entries => "archive entries",
            Self::SnapshotDiff => "snapshot diff",
            Self::StagedTree => "staged tree",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub target: PathBuf,
    pub archive_name: String,
    pub files: Vec<String>,
    pub backed_up: Vec<String>,
    pub strategy: String,
    pub enumeration: Enumeration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallStatus {
    NotInstalled,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub target: PathBuf,
    pub status: UninstallStatus,
    pub removed: Vec<String>,
    pub restored: Vec<String>,
    pub removed_dirs: Vec<String>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStatus {
    pub target: PathBuf,
    pub installed: bool,
    pub marker: Option<InstalledMarker>,
    pub manifest: Option<InstallManifest>,
    pub backup: Option<BackupRecord>,
}
