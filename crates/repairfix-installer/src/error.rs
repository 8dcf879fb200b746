use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Failures a caller is expected to tell apart. Carried inside `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("archive not found: {}", .archive.display())]
    ArchiveNotFound { archive: PathBuf },

    #[error("install target is not a directory: {}", .target.display())]
    TargetNotDirectory { target: PathBuf },

    #[error("no extraction strategy is available for {}", .archive.display())]
    NoStrategyAvailable { archive: PathBuf },

    #[error(
        "failed to extract {}: every extraction strategy failed ({})",
        .archive.display(),
        join_failures(.attempts)
    )]
    ExtractionFailed {
        archive: PathBuf,
        attempts: Vec<StrategyFailure>,
    },
}

fn join_failures(attempts: &[StrategyFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
