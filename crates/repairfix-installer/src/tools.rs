use anyhow::{anyhow, Context, Result};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Where to look for one external tool: fixed install paths first, then `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolSpec {
    pub label: String,
    pub candidates: Vec<PathBuf>,
    pub search_names: Vec<String>,
}

impl ToolSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn seven_zip() -> Self {
        Self::new("7-Zip")
            .with_candidates([
                r"C:\Program Files\7-Zip\7z.exe",
                r"C:\Program Files (x86)\7-Zip\7z.exe",
                "/usr/bin/7z",
                "/usr/local/bin/7z",
                "/opt/homebrew/bin/7z",
            ])
            .with_search_names(["7z", "7zz", "7za"])
    }

    /// The first candidate is the primary install location, the second the 32-bit one.
    pub fn secondary_archiver() -> Self {
        Self::new("UnRAR")
            .with_candidates([
                r"C:\Program Files\WinRAR\UnRAR.exe",
                r"C:\Program Files (x86)\WinRAR\UnRAR.exe",
            ])
            .with_search_names(["unrar"])
    }

    pub fn tar() -> Self {
        Self::new("tar")
            .with_candidates([r"C:\Windows\System32\tar.exe"])
            .with_search_names(["tar", "bsdtar"])
    }

    pub fn locate(&self, search_path: bool) -> Option<PathBuf> {
        if let Some(found) = self.candidates.iter().find(|candidate| candidate.is_file()) {
            return Some(found.clone());
        }
        if !search_path {
            return None;
        }
        self.search_names
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub seven_zip: ToolSpec,
    pub secondary_archiver: ToolSpec,
    pub tar: ToolSpec,
    pub search_path: bool,
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            seven_zip: ToolSpec::seven_zip(),
            secondary_archiver: ToolSpec::secondary_archiver(),
            tar: ToolSpec::tar(),
            search_path: true,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ToolConfig {
    /// No external tool will ever be found.
    pub fn isolated() -> Self {
        Self {
            seven_zip: ToolSpec::new("7-Zip"),
            secondary_archiver: ToolSpec::new("UnRAR"),
            tar: ToolSpec::new("tar"),
            search_path: false,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn locate_seven_zip(&self) -> Option<PathBuf> {
        self.seven_zip.locate(self.search_path)
    }

    pub fn locate_tar(&self) -> Option<PathBuf> {
        self.tar.locate(self.search_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `command` to completion, killing it once `timeout` elapses.
pub fn run_tool(command: &mut Command, timeout: Duration, context_message: &str) -> Result<ToolOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .with_context(|| format!("{context_message}: command failed to start"))?;

    let stdout_reader = child.stdout.take().map(drain_pipe);
    let stderr_reader = child.stderr.take().map(drain_pipe);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child
            .try_wait()
            .with_context(|| format!("{context_message}: failed waiting for command"))?
        {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "{context_message}: timed out after {}s",
                    timeout.as_secs()
                ));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = collect_pipe(stdout_reader);
    let stderr = collect_pipe(stderr_reader);
    if status.success() {
        return Ok(ToolOutput { stdout, stderr });
    }

    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        status,
        stdout.trim(),
        stderr.trim()
    ))
}

fn drain_pipe<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn collect_pipe(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

pub(crate) fn error_chain_has_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
    })
}
