use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

/// Modification times closer than this are considered equal.
pub const MTIME_TOLERANCE_MILLIS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified_millis: i64,
}

/// Relative path (forward slashes) → size and modification time, for every
/// file below a root directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    files: BTreeMap<String, FileStamp>,
}

impl DirectorySnapshot {
    /// Walks `root` recursively, hidden directories included. Anything that
    /// cannot be read or stat'ed is left out. A missing root yields an empty
    /// snapshot.
    pub fn capture(root: &Path) -> Self {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Some(rel) = relative_key(root, entry.path()) else {
                continue;
            };
            let modified_millis = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_millis() as i64)
                .unwrap_or(0);
            files.insert(
                rel,
                FileStamp {
                    size: metadata.len(),
                    modified_millis,
                },
            );
        }
        Self { files }
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, FileStamp)>,
    {
        Self {
            files: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, rel: &str) -> Option<&FileStamp> {
        self.files.get(rel)
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.files.contains_key(rel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileStamp)> {
        self.files.iter()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Paths added or modified between `before` and `self`, sorted.
    /// Deletions are not reported.
    pub fn changed_since(&self, before: &DirectorySnapshot) -> Vec<String> {
        diff(before, self)
    }
}

/// A path is changed when it is new, its size differs, or its modification
/// time moved by more than [`MTIME_TOLERANCE_MILLIS`].
pub fn diff(before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<String> {
    after
        .files
        .iter()
        .filter(|(rel, stamp)| match before.files.get(*rel) {
            None => true,
            Some(previous) => {
                previous.size != stamp.size
                    || (previous.modified_millis - stamp.modified_millis).abs()
                        > MTIME_TOLERANCE_MILLIS
            }
        })
        .map(|(rel, _)| rel.clone())
        .collect()
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
