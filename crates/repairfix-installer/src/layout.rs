use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "._repair_fix_manifest.json";
pub const BACKUP_INFO_FILE_NAME: &str = "._repair_fix_backup_info.json";
pub const BACKUP_DIR_NAME: &str = "._repair_fix_backup";
pub const MARKER_FILE_NAME: &str = "._repair_fix_installed.json";
pub const STAGING_DIR_NAME: &str = "._repair_fix_staging";

const BOOKKEEPING_PREFIX: &str = "._repair_fix_";

/// Paths of every bookkeeping file kept inside one target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn backup_info_path(&self) -> PathBuf {
        self.root.join(BACKUP_INFO_FILE_NAME)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR_NAME)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE_NAME)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    pub fn target_path(&self, rel: &str) -> Result<PathBuf> {
        Ok(self.root.join(safe_relative_path(rel)?))
    }

    pub fn backup_copy_path(&self, rel: &str) -> Result<PathBuf> {
        Ok(self.backup_dir().join(safe_relative_path(rel)?))
    }

    pub fn ensure_target_dir(&self) -> Result<()> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(crate::InstallError::TargetNotDirectory {
                target: self.root.clone(),
            }
            .into());
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))
    }

    pub fn ensure_backup_dir(&self) -> Result<PathBuf> {
        let dir = self.backup_dir();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}

/// True for any path whose first component is one of our own state files.
pub fn is_bookkeeping_path(rel: &str) -> bool {
    rel.split('/')
        .next()
        .is_some_and(|first| first.starts_with(BOOKKEEPING_PREFIX))
}

/// Accepts only plain relative paths; `..`, roots and drive prefixes are rejected.
pub fn safe_relative_path(rel: &str) -> Result<PathBuf> {
    let trimmed = rel.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("relative path must not be empty"));
    }

    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(value) => out.push(value),
            Component::CurDir => {}
            _ => return Err(anyhow!("path escapes the target directory: {rel}")),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(anyhow!("relative path must not be empty"));
    }
    Ok(out)
}

pub fn default_user_prefix() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows user prefix")?;
        return Ok(PathBuf::from(app_data).join("RepairFix"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".repairfix"))
}
