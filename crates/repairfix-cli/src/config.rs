use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use repairfix_installer::{default_user_prefix, ToolConfig, DEFAULT_TOOL_TIMEOUT};
use serde::Deserialize;

pub(crate) const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) games: BTreeMap<String, PathBuf>,
    pub(crate) tools: ToolsSection,
    pub(crate) install: InstallSection,
}

/// Candidate lists replace the built-in install locations when present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ToolsSection {
    pub(crate) seven_zip: Option<Vec<PathBuf>>,
    pub(crate) secondary_archiver: Option<Vec<PathBuf>>,
    pub(crate) tar: Option<Vec<PathBuf>>,
    pub(crate) search_path: bool,
    pub(crate) timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            seven_zip: None,
            secondary_archiver: None,
            tar: None,
            search_path: true,
            timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct InstallSection {
    pub(crate) staged: bool,
}

impl Config {
    pub(crate) fn default_path() -> Result<PathBuf> {
        Ok(default_user_prefix()?.join(CONFIG_FILE_NAME))
    }

    /// A missing file yields the defaults.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed parsing config: {}", path.display()))
    }

    pub(crate) fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.tools.timeout_secs == 0 {
            return Err(anyhow!("tools.timeout_secs must be greater than zero"));
        }
        Ok(config)
    }

    pub(crate) fn tool_config(&self) -> ToolConfig {
        let mut tools = ToolConfig {
            search_path: self.tools.search_path,
            timeout: Duration::from_secs(self.tools.timeout_secs),
            ..ToolConfig::default()
        };
        if let Some(candidates) = &self.tools.seven_zip {
            tools.seven_zip.candidates = candidates.clone();
        }
        if let Some(candidates) = &self.tools.secondary_archiver {
            tools.secondary_archiver.candidates = candidates.clone();
        }
        if let Some(candidates) = &self.tools.tar {
            tools.tar.candidates = candidates.clone();
        }
        tools
    }

    pub(crate) fn game_dir(&self, game: &str) -> Result<&Path> {
        self.games
            .get(game)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("unknown game '{game}': add it to the [games] table of the config"))
    }
}
