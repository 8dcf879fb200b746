use anyhow::{anyhow, Context, Result};
use repairfix_core::ArchiveFormat;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{InstallError, StrategyFailure};
use crate::tools::{error_chain_has_not_found, run_tool, ToolConfig, ToolSpec};

/// One way of unpacking an archive into a directory, overwriting conflicts.
/// A failed attempt may leave partial output behind.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn supports(&self, _archive: &Path) -> bool {
        true
    }

    fn try_extract(&self, archive: &Path, destination: &Path, password: Option<&str>) -> Result<()>;
}

/// Tries each strategy in order and stops at the first success.
pub struct ExtractionEngine {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl ExtractionEngine {
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// 7-Zip, then tar for tar archives, then the secondary archiver at each
    /// known install location (and `PATH`), then the built-in zip decoder.
    pub fn from_tools(tools: &ToolConfig) -> Self {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(SevenZipCli::new(tools.seven_zip.clone(), tools.search_path, tools.timeout)),
            Box::new(TarCli::new(tools.tar.clone(), tools.search_path, tools.timeout)),
        ];
        for candidate in &tools.secondary_archiver.candidates {
            strategies.push(Box::new(SecondaryArchiverCli::at(
                &tools.secondary_archiver.label,
                candidate.clone(),
                tools.timeout,
            )));
        }
        if tools.search_path {
            for name in &tools.secondary_archiver.search_names {
                strategies.push(Box::new(SecondaryArchiverCli::on_path(
                    &tools.secondary_archiver.label,
                    name,
                    tools.timeout,
                )));
            }
        }
        strategies.push(Box::new(InProcessZip));
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .map(|strategy| strategy.name().to_string())
            .collect()
    }

    /// Returns the name of the strategy that succeeded.
    pub fn extract(&self, archive: &Path, destination: &Path, password: Option<&str>) -> Result<String> {
        if !archive.is_file() {
            return Err(InstallError::ArchiveNotFound {
                archive: archive.to_path_buf(),
            }
            .into());
        }
        fs::create_dir_all(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;

        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            if !strategy.supports(archive) {
                continue;
            }
            if !strategy.is_available() {
                debug!(strategy = strategy.name(), "extraction strategy unavailable");
                continue;
            }

            match strategy.try_extract(archive, destination, password) {
                Ok(()) => {
                    info!(
                        strategy = strategy.name(),
                        archive = %archive.display(),
                        destination = %destination.display(),
                        "extracted archive"
                    );
                    return Ok(strategy.name().to_string());
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), "extraction attempt failed: {err:#}");
                    attempts.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        if attempts.is_empty() {
            return Err(InstallError::NoStrategyAvailable {
                archive: archive.to_path_buf(),
            }
            .into());
        }
        Err(InstallError::ExtractionFailed {
            archive: archive.to_path_buf(),
            attempts,
        }
        .into())
    }
}

#[derive(Debug, Clone)]
pub struct SevenZipCli {
    spec: ToolSpec,
    search_path: bool,
    timeout: Duration,
}

impl SevenZipCli {
    pub fn new(spec: ToolSpec, search_path: bool, timeout: Duration) -> Self {
        Self {
            spec,
            search_path,
            timeout,
        }
    }
}

impl ExtractionStrategy for SevenZipCli {
    fn name(&self) -> &str {
        &self.spec.label
    }

    fn is_available(&self) -> bool {
        self.spec.locate(self.search_path).is_some()
    }

    // 7-Zip only peels the gzip layer off a .tar.gz.
    fn supports(&self, archive: &Path) -> bool {
        ArchiveFormat::detect(archive) != Some(ArchiveFormat::TarGz)
    }

    fn try_extract(&self, archive: &Path, destination: &Path, password: Option<&str>) -> Result<()> {
        let executable = self
            .spec
            .locate(self.search_path)
            .ok_or_else(|| anyhow!("{} executable not found", self.spec.label))?;
        let mut command = build_seven_zip_extract_command(&executable, archive, destination, password);
        run_tool(&mut command, self.timeout, "failed to extract archive with 7-Zip")
            .map(|_| ())
            .map_err(|err| explain_missing_tool(err, &self.spec.label))
    }
}

#[derive(Debug, Clone)]
enum ArchiverLocation {
    Fixed(PathBuf),
    OnPath(String),
}

/// The secondary archiver at one specific location.
#[derive(Debug, Clone)]
pub struct SecondaryArchiverCli {
    name: String,
    location: ArchiverLocation,
    timeout: Duration,
}

impl SecondaryArchiverCli {
    pub fn at(label: &str, executable: PathBuf, timeout: Duration) -> Self {
        Self {
            name: format!("{label} ({})", executable.display()),
            location: ArchiverLocation::Fixed(executable),
            timeout,
        }
    }

    pub fn on_path(label: &str, program: &str, timeout: Duration) -> Self {
        Self {
            name: format!("{label} (PATH: {program})"),
            location: ArchiverLocation::OnPath(program.to_string()),
            timeout,
        }
    }

    fn executable(&self) -> Option<PathBuf> {
        match &self.location {
            ArchiverLocation::Fixed(path) => path.is_file().then(|| path.clone()),
            ArchiverLocation::OnPath(program) => which::which(program).ok(),
        }
    }
}

impl ExtractionStrategy for SecondaryArchiverCli {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    fn supports(&self, archive: &Path) -> bool {
        !ArchiveFormat::detect(archive).is_some_and(ArchiveFormat::is_tar_family)
    }

    fn try_extract(&self, archive: &Path, destination: &Path, password: Option<&str>) -> Result<()> {
        let executable = self
            .executable()
            .ok_or_else(|| anyhow!("{} is not installed", self.name))?;
        let mut command =
            build_secondary_archiver_extract_command(&executable, archive, destination, password);
        run_tool(&mut command, self.timeout, "failed to extract archive with secondary archiver")
            .map(|_| ())
            .map_err(|err| explain_missing_tool(err, &self.name))
    }
}

#[derive(Debug, Clone)]
pub struct TarCli {
    spec: ToolSpec,
    search_path: bool,
    timeout: Duration,
}

impl TarCli {
    pub fn new(spec: ToolSpec, search_path: bool, timeout: Duration) -> Self {
        Self {
            spec,
            search_path,
            timeout,
        }
    }
}

impl ExtractionStrategy for TarCli {
    fn name(&self) -> &str {
        &self.spec.label
    }

    fn is_available(&self) -> bool {
        self.spec.locate(self.search_path).is_some()
    }

    fn supports(&self, archive: &Path) -> bool {
        ArchiveFormat::detect(archive).is_some_and(ArchiveFormat::is_tar_family)
    }

    fn try_extract(&self, archive: &Path, destination: &Path, _password: Option<&str>) -> Result<()> {
        let executable = self
            .spec
            .locate(self.search_path)
            .ok_or_else(|| anyhow!("{} executable not found", self.spec.label))?;
        let mut command = Command::new(executable);
        command.arg("-xf").arg(archive).arg("-C").arg(destination);
        run_tool(&mut command, self.timeout, "failed to extract tar archive")
            .map(|_| ())
            .map_err(|err| explain_missing_tool(err, &self.spec.label))
    }
}

/// Built-in zip decoder, the last resort. Only takes payloads that carry a
/// zip signature. Encrypted entries require the password.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessZip;

impl ExtractionStrategy for InProcessZip {
    fn name(&self) -> &str {
        "built-in zip"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, archive: &Path) -> bool {
        is_zip_shaped(archive)
    }

    fn try_extract(&self, archive: &Path, destination: &Path, password: Option<&str>) -> Result<()> {
        extract_zip_in_process(archive, destination, password)
    }
}

pub(crate) fn build_seven_zip_extract_command(
    executable: &Path,
    archive: &Path,
    destination: &Path,
    password: Option<&str>,
) -> Command {
    let mut command = Command::new(executable);
    command
        .arg("x")
        .arg(archive)
        .arg(format!("-o{}", destination.display()))
        .arg("-aoa")
        .arg("-y");
    if let Some(password) = password.filter(|value| !value.is_empty()) {
        command.arg(format!("-p{password}"));
    }
    command
}

pub(crate) fn build_secondary_archiver_extract_command(
    executable: &Path,
    archive: &Path,
    destination: &Path,
    password: Option<&str>,
) -> Command {
    let mut command = Command::new(executable);
    command.arg("x").arg("-o+").arg("-y");
    match password.filter(|value| !value.is_empty()) {
        Some(password) => command.arg(format!("-p{password}")),
        None => command.arg("-p-"),
    };
    let mut destination_arg = destination.as_os_str().to_os_string();
    destination_arg.push(std::path::MAIN_SEPARATOR_STR);
    command.arg(archive).arg(destination_arg);
    command
}

fn explain_missing_tool(err: anyhow::Error, label: &str) -> anyhow::Error {
    if error_chain_has_not_found(&err) {
        return anyhow!("required extraction tool '{label}' could not be started: {err:#}");
    }
    err
}

pub fn is_zip_shaped(archive: &Path) -> bool {
    let mut signature = [0_u8; 4];
    File::open(archive)
        .and_then(|mut file| file.read_exact(&mut signature))
        .is_ok()
        && (signature == *b"PK\x03\x04" || signature == *b"PK\x05\x06")
}

pub(crate) fn extract_zip_in_process(archive: &Path, destination: &Path, password: Option<&str>) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read zip directory of {}", archive.display()))?;
    let password = password.filter(|value| !value.is_empty());

    for index in 0..zip.len() {
        let encrypted = zip
            .by_index_raw(index)
            .with_context(|| format!("failed to read zip record {index}"))?
            .encrypted();
        let mut entry = if encrypted {
            let password = password.ok_or_else(|| {
                anyhow!("zip record {index} is encrypted and no password was supplied")
            })?;
            zip.by_index_decrypt(index, password.as_bytes())
                .with_context(|| format!("failed to decrypt zip record {index}"))?
        } else {
            zip.by_index(index)
                .with_context(|| format!("failed to read zip record {index}"))?
        };

        let Some(rel) = entry.enclosed_name() else {
            return Err(anyhow!(
                "zip entry '{}' escapes the destination directory",
                entry.name()
            ));
        };
        let out_path = destination.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to write {}", out_path.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;

            fs::set_permissions(&out_path, fs::Permissions::from_mode((mode & 0o777) | 0o200))
                .with_context(|| format!("failed to set mode on {}", out_path.display()))?;
        }
    }

    debug!(archive = %archive.display(), entries = zip.len(), "unpacked zip in process");
    Ok(())
}
