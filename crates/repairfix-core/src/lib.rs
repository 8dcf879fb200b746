mod archive;
mod entry;
mod manifest;

pub use archive::ArchiveFormat;
pub use entry::{normalize_entry_name, ArchiveEntry};
pub use manifest::{BackupRecord, InstallManifest, InstalledMarker, OriginalFile, OriginalFileKind};
