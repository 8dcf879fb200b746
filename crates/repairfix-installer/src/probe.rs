use anyhow::{anyhow, Context, Result};
use repairfix_core::{normalize_entry_name, ArchiveEntry, ArchiveFormat};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::tools::{run_tool, ToolConfig};

// Column offsets of 7-Zip's bare listing (`7z l -ba`).
const SEVEN_ZIP_ATTR_COLUMN: usize = 20;
const SEVEN_ZIP_SIZE_COLUMN: usize = 26;
const SEVEN_ZIP_NAME_COLUMN: usize = 53;

/// Enumerates archive contents. Never fails: an empty result means the
/// contents are unknown, not that the archive is empty.
#[derive(Debug, Clone)]
pub struct ArchiveProbe {
    tools: ToolConfig,
}

impl ArchiveProbe {
    pub fn new(tools: ToolConfig) -> Self {
        Self { tools }
    }

    pub fn list_entries(&self, archive: &Path) -> Vec<ArchiveEntry> {
        let Some(format) = ArchiveFormat::detect(archive) else {
            debug!(archive = %archive.display(), "unsupported archive extension, contents unknown");
            return Vec::new();
        };

        let listed = match format {
            ArchiveFormat::Zip => list_zip_entries(archive),
            ArchiveFormat::Rar | ArchiveFormat::SevenZip => self.list_with_archiver(archive),
            ArchiveFormat::Tar | ArchiveFormat::TarGz => self.list_with_tar(archive),
        };

        match listed {
            Ok(entries) => {
                debug!(
                    archive = %archive.display(),
                    format = format.as_str(),
                    entries = entries.len(),
                    "enumerated archive"
                );
                entries
            }
            Err(err) => {
                debug!(
                    archive = %archive.display(),
                    format = format.as_str(),
                    "archive enumeration unavailable: {err:#}"
                );
                Vec::new()
            }
        }
    }

    fn list_with_archiver(&self, archive: &Path) -> Result<Vec<ArchiveEntry>> {
        let tool = self
            .tools
            .locate_seven_zip()
            .ok_or_else(|| anyhow!("no {} executable found", self.tools.seven_zip.label))?;
        let mut command = Command::new(&tool);
        command.arg("l").arg("-ba").arg(archive);
        let output = run_tool(&mut command, self.tools.timeout, "failed to list archive")?;
        Ok(parse_archiver_listing(&output.stdout))
    }

    fn list_with_tar(&self, archive: &Path) -> Result<Vec<ArchiveEntry>> {
        let tool = self
            .tools
            .locate_tar()
            .ok_or_else(|| anyhow!("no {} executable found", self.tools.tar.label))?;
        let mut command = Command::new(&tool);
        command.arg("-tf").arg(archive);
        let output = run_tool(&mut command, self.tools.timeout, "failed to list tar archive")?;
        Ok(parse_tar_listing(&output.stdout))
    }
}

pub(crate) fn list_zip_entries(archive: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read zip directory of {}", archive.display()))?;

    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let record = zip
            .by_index_raw(index)
            .with_context(|| format!("failed to read zip record {index}"))?;
        let name = normalize_entry_name(record.name());
        if name.is_empty() {
            continue;
        }
        entries.push(if record.is_dir() {
            ArchiveEntry::directory(name)
        } else {
            ArchiveEntry::file(name, record.size())
        });
    }
    Ok(entries)
}

/// Parses archiver list output. Size-first rows (`<size|<DIR>> <name...>`)
/// and 7-Zip's fixed-width bare rows are understood; everything else is
/// treated as header noise.
pub fn parse_archiver_listing(output: &str) -> Vec<ArchiveEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || is_separator_line(line) {
            continue;
        }

        if let Some(entry) = parse_seven_zip_row(line) {
            entries.push(entry);
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let name = fields.collect::<Vec<_>>().join(" ");
        let name = normalize_entry_name(&name);
        if name.is_empty() {
            continue;
        }

        if first.eq_ignore_ascii_case("<DIR>") {
            entries.push(ArchiveEntry::directory(name));
        } else if let Ok(size) = first.parse::<u64>() {
            entries.push(ArchiveEntry::file(name, size));
        }
    }
    entries
}

/// One entry per line; a trailing `/` marks a directory. Sizes are not reported.
pub fn parse_tar_listing(output: &str) -> Vec<ArchiveEntry> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let is_directory = line.ends_with('/');
            let name = normalize_entry_name(line);
            if name.is_empty() {
                return None;
            }
            Some(if is_directory {
                ArchiveEntry::directory(name)
            } else {
                ArchiveEntry::file(name, 0)
            })
        })
        .collect()
}

fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("---") && trimmed.chars().all(|ch| ch == '-' || ch.is_whitespace())
}

fn parse_seven_zip_row(line: &str) -> Option<ArchiveEntry> {
    let stamp = line.get(..SEVEN_ZIP_ATTR_COLUMN - 1)?;
    if !(is_seven_zip_timestamp(stamp) || stamp.trim().is_empty()) {
        return None;
    }
    let attributes = line.get(SEVEN_ZIP_ATTR_COLUMN..SEVEN_ZIP_ATTR_COLUMN + 5)?;
    if !attributes
        .chars()
        .all(|ch| matches!(ch, 'D' | 'R' | 'H' | 'S' | 'A' | 'N' | 'I' | 'L' | '.'))
    {
        return None;
    }

    let name = normalize_entry_name(line.get(SEVEN_ZIP_NAME_COLUMN..)?);
    if name.is_empty() {
        return None;
    }
    if attributes.starts_with('D') {
        return Some(ArchiveEntry::directory(name));
    }

    let size = line
        .get(SEVEN_ZIP_SIZE_COLUMN..SEVEN_ZIP_SIZE_COLUMN + 12)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(0);
    Some(ArchiveEntry::file(name, size))
}

fn is_seven_zip_timestamp(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            10 => *byte == b' ',
            13 | 16 => *byte == b':',
            _ => byte.is_ascii_digit(),
        })
}
