use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Every relative path an install added or overwrote, in install order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallManifest {
    #[serde(rename = "archive")]
    pub archive_name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(rename = "totalFiles")]
    pub total_files: usize,
    #[serde(with = "iso_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl InstallManifest {
    pub fn new(archive_name: impl Into<String>, files: Vec<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            archive_name: archive_name.into(),
            total_files: files.len(),
            files,
            updated_at,
        }
    }

    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        let manifest: Self =
            serde_json::from_str(input).context("failed to parse install manifest")?;
        if manifest.total_files != manifest.files.len() {
            return Err(anyhow!(
                "install manifest for '{}' declares {} files but lists {}",
                manifest.archive_name,
                manifest.total_files,
                manifest.files.len()
            ));
        }
        Ok(manifest)
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize install manifest")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OriginalFileKind {
    File,
    Directory,
}

/// A path recorded in the backup record. Older records store bare strings,
/// newer ones may tag the entry kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OriginalFileRepr", into = "OriginalFileRepr")]
pub struct OriginalFile {
    pub path: String,
    pub kind: Option<OriginalFileKind>,
}

impl OriginalFile {
    pub fn untagged(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: None,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: Some(OriginalFileKind::File),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == Some(OriginalFileKind::Directory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum OriginalFileRepr {
    Path(String),
    Tagged {
        path: String,
        #[serde(rename = "type")]
        kind: OriginalFileKind,
    },
}

impl From<OriginalFileRepr> for OriginalFile {
    fn from(value: OriginalFileRepr) -> Self {
        match value {
            OriginalFileRepr::Path(path) => Self { path, kind: None },
            OriginalFileRepr::Tagged { path, kind } => Self {
                path,
                kind: Some(kind),
            },
        }
    }
}

impl From<OriginalFile> for OriginalFileRepr {
    fn from(value: OriginalFile) -> Self {
        match value.kind {
            Some(kind) => Self::Tagged {
                path: value.path,
                kind,
            },
            None => Self::Path(value.path),
        }
    }
}

/// Where the pre-install copies of overwritten files live and which paths
/// the install touched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    #[serde(rename = "originalFiles", alias = "changedFiles", default)]
    pub original_files: Vec<OriginalFile>,
    #[serde(rename = "backupDir", alias = "backupPath")]
    pub backup_dir: String,
    #[serde(rename = "installedAt", with = "iso_timestamp")]
    pub installed_at: DateTime<Utc>,
    #[serde(rename = "archiveName", alias = "fileName", default)]
    pub archive_file_name: String,
}

impl BackupRecord {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse backup record")
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize backup record")
    }
}

/// Content is advisory; only the file's existence matters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledMarker {
    #[serde(rename = "installedAt", with = "iso_timestamp")]
    pub installed_at: DateTime<Utc>,
    pub version: String,
}

impl InstalledMarker {
    pub fn new(installed_at: DateTime<Utc>, version: impl Into<String>) -> Self {
        Self {
            installed_at,
            version: version.into(),
        }
    }

    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse installed marker")
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize installed marker")
    }
}

mod iso_timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
