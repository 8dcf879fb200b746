mod error;
mod extract;
mod fs_utils;
mod install;
mod layout;
mod probe;
mod snapshot;
mod state;
mod tools;
mod types;
mod uninstall;

pub use error::{InstallError, StrategyFailure};
pub use extract::{
    is_zip_shaped, ExtractionEngine, ExtractionStrategy, InProcessZip, SecondaryArchiverCli,
    SevenZipCli, TarCli,
};
pub use install::Installer;
pub use layout::{
    default_user_prefix, is_bookkeeping_path, safe_relative_path, TargetLayout, BACKUP_DIR_NAME,
    BACKUP_INFO_FILE_NAME, MANIFEST_FILE_NAME, MARKER_FILE_NAME, STAGING_DIR_NAME,
};
pub use probe::{parse_archiver_listing, parse_tar_listing, ArchiveProbe};
pub use snapshot::{diff, DirectorySnapshot, FileStamp, MTIME_TOLERANCE_MILLIS};
pub use state::{
    is_installed, read_backup_record, read_install_manifest, read_install_status,
    read_installed_marker,
};
pub use tools::{run_tool, ToolConfig, ToolOutput, ToolSpec, DEFAULT_TOOL_TIMEOUT};
pub use types::{
    CommitMode, Enumeration, FileFailure, InstallOptions, InstallOutcome, InstallStatus,
    UninstallReport, UninstallStatus,
};
pub use uninstall::uninstall;
