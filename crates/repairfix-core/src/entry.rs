use serde::{Deserialize, Serialize};

/// One record of an archive listing. `size` is 0 when the listing tool does
/// not report it, so a zero size on a file entry does not mean "empty file".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

impl ArchiveEntry {
    pub fn file(name: impl AsRef<str>, size: u64) -> Self {
        Self {
            name: normalize_entry_name(name.as_ref()),
            is_directory: false,
            size,
        }
    }

    pub fn directory(name: impl AsRef<str>) -> Self {
        Self {
            name: normalize_entry_name(name.as_ref()),
            is_directory: true,
            size: 0,
        }
    }
}

/// Forward slashes, no leading `./` or `/`, no trailing separator.
pub fn normalize_entry_name(raw: &str) -> String {
    let mut name = raw.trim().replace('\\', "/");
    while let Some(rest) = name.strip_prefix("./") {
        name = rest.to_string();
    }
    name.trim_matches('/').to_string()
}
