use std::path::{Path, PathBuf};

use anyhow::Result;
use repairfix_core::ArchiveEntry;
use repairfix_installer::{
    read_install_status, uninstall, ArchiveProbe, CommitMode, DirectorySnapshot,
    ExtractionEngine, InstallOptions, InstallOutcome, InstallStatus, Installer, ToolConfig,
    UninstallReport, UninstallStatus,
};
use tracing::debug;

use crate::config::Config;
use crate::render::{current_output_style, render_status_line, OutputStyle, TerminalRenderer};
use crate::{Cli, Commands, TargetArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::from_style(current_output_style(cli.plain));
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;
    debug!(config = %config_path.display(), games = config.games.len(), "loaded configuration");

    match cli.command {
        Commands::Install {
            archive,
            target,
            password,
            staged,
        } => {
            let target = resolve_target(&config, &target)?;
            let options = InstallOptions {
                password: password.as_deref(),
                commit_mode: resolve_commit_mode(staged, &config),
            };
            let outcome = Installer::new(config.tool_config()).install(&archive, &target, options)?;
            renderer.print_section(&format!("Installed {}", outcome.archive_name));
            renderer.print_lines(&format_install_outcome_lines(&outcome, renderer.style()));
        }
        Commands::Uninstall { target } => {
            let target = resolve_target(&config, &target)?;
            let report = uninstall(&target)?;
            renderer.print_section("Uninstall");
            renderer.print_lines(&format_uninstall_report_lines(&report, renderer.style()));
        }
        Commands::Status { target } => {
            let target = resolve_target(&config, &target)?;
            let status = read_install_status(&target)?;
            renderer.print_lines(&format_status_lines(&status, renderer.style()));
        }
        Commands::List => {
            if config.games.is_empty() {
                println!(
                    "{}",
                    render_status_line(
                        renderer.style(),
                        "step",
                        &format!("no games configured in {}", config_path.display()),
                    )
                );
                return Ok(());
            }
            let statuses = config
                .games
                .iter()
                .map(|(game, dir)| (game.clone(), read_install_status(dir)))
                .collect::<Vec<_>>();
            renderer.print_lines(&format_list_lines(&statuses, renderer.style()));
        }
        Commands::Probe { archive } => {
            let entries = ArchiveProbe::new(config.tool_config()).list_entries(&archive);
            renderer.print_lines(&format_probe_lines(&archive, &entries, renderer.style()));
        }
        Commands::Snapshot { dir } => {
            let snapshot = DirectorySnapshot::capture(&dir);
            renderer.print_lines(&format_snapshot_lines(&snapshot));
        }
        Commands::Tools => {
            renderer.print_lines(&format_tools_lines(&config.tool_config(), renderer.style()));
        }
    }

    Ok(())
}

pub(crate) fn resolve_target(config: &Config, args: &TargetArgs) -> Result<PathBuf> {
    match (&args.target, &args.game) {
        (Some(target), _) => Ok(target.clone()),
        (None, Some(game)) => Ok(config.game_dir(game)?.to_path_buf()),
        (None, None) => Err(anyhow::anyhow!("either --target or --game is required")),
    }
}

pub(crate) fn resolve_commit_mode(staged_flag: bool, config: &Config) -> CommitMode {
    if staged_flag || config.install.staged {
        CommitMode::Staged
    } else {
        CommitMode::Direct
    }
}

pub(crate) fn format_install_outcome_lines(outcome: &InstallOutcome, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![
        render_status_line(
            style,
            "ok",
            &format!(
                "installed {} into {} ({} files via {})",
                outcome.archive_name,
                outcome.target.display(),
                outcome.files.len(),
                outcome.strategy
            ),
        ),
        render_status_line(
            style,
            "step",
            &format!("changed files taken from {}", outcome.enumeration.as_str()),
        ),
    ];
    for rel in &outcome.backed_up {
        lines.push(render_status_line(style, "step", &format!("backed up {rel}")));
    }
    for rel in &outcome.files {
        lines.push(render_status_line(style, "step", &format!("wrote {rel}")));
    }
    lines
}

pub(crate) fn format_uninstall_report_lines(report: &UninstallReport, style: OutputStyle) -> Vec<String> {
    if report.status == UninstallStatus::NotInstalled {
        return vec![render_status_line(
            style,
            "step",
            &format!("nothing installed in {}", report.target.display()),
        )];
    }

    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!(
            "uninstalled from {}: removed={} restored={} dirs={}",
            report.target.display(),
            report.removed.len(),
            report.restored.len(),
            report.removed_dirs.len()
        ),
    )];
    for failure in &report.failures {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("could not process {}: {}", failure.path, failure.reason),
        ));
    }
    lines
}

pub(crate) fn format_status_lines(status: &InstallStatus, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    if status.installed {
        lines.push(render_status_line(
            style,
            "ok",
            &format!("{}: installed", status.target.display()),
        ));
    } else {
        lines.push(render_status_line(
            style,
            "step",
            &format!("{}: not installed", status.target.display()),
        ));
    }
    if let Some(marker) = &status.marker {
        lines.push(format!(
            "installed at {} by version {}",
            marker.installed_at, marker.version
        ));
    }
    if let Some(manifest) = &status.manifest {
        lines.push(format!(
            "archive {}: {} files, updated {}",
            manifest.archive_name, manifest.total_files, manifest.updated_at
        ));
    }
    if let Some(backup) = &status.backup {
        lines.push(format!(
            "{} files recorded for restore in {}",
            backup.original_files.len(),
            backup.backup_dir
        ));
    }
    lines
}

pub(crate) fn format_list_lines(
    statuses: &[(String, Result<InstallStatus>)],
    style: OutputStyle,
) -> Vec<String> {
    statuses
        .iter()
        .map(|(game, status)| match status {
            Ok(status) if status.installed => {
                let detail = status
                    .manifest
                    .as_ref()
                    .map(|manifest| {
                        format!(" ({}, {} files)", manifest.archive_name, manifest.total_files)
                    })
                    .unwrap_or_default();
                render_status_line(style, "ok", &format!("{game}: installed{detail}"))
            }
            Ok(_) => render_status_line(style, "step", &format!("{game}: not installed")),
            Err(err) => render_status_line(style, "err", &format!("{game}: {err:#}")),
        })
        .collect()
}

pub(crate) fn format_probe_lines(archive: &Path, entries: &[ArchiveEntry], style: OutputStyle) -> Vec<String> {
    if entries.is_empty() {
        return vec![render_status_line(
            style,
            "warn",
            &format!(
                "enumeration unavailable for {}; install falls back to a snapshot diff",
                archive.display()
            ),
        )];
    }

    let mut lines = entries
        .iter()
        .map(|entry| {
            if entry.is_directory {
                format!("{:>12}  {}/", "<DIR>", entry.name)
            } else {
                format!("{:>12}  {}", entry.size, entry.name)
            }
        })
        .collect::<Vec<_>>();
    lines.push(render_status_line(
        style,
        "ok",
        &format!("{} entries in {}", entries.len(), archive.display()),
    ));
    lines
}

pub(crate) fn format_snapshot_lines(snapshot: &DirectorySnapshot) -> Vec<String> {
    let mut lines = snapshot
        .iter()
        .map(|(rel, stamp)| format!("{}\t{}\t{}", stamp.size, stamp.modified_millis, rel))
        .collect::<Vec<_>>();
    lines.push(format!("{} files", snapshot.len()));
    lines
}

pub(crate) fn format_tools_lines(tools: &ToolConfig, style: OutputStyle) -> Vec<String> {
    let mut lines = [&tools.seven_zip, &tools.secondary_archiver, &tools.tar]
        .into_iter()
        .map(|spec| match spec.locate(tools.search_path) {
            Some(path) => render_status_line(
                style,
                "ok",
                &format!("{}: {}", spec.label, path.display()),
            ),
            None => render_status_line(style, "warn", &format!("{}: not found", spec.label)),
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "extraction order: {}",
        ExtractionEngine::from_tools(tools).strategy_names().join(" -> ")
    ));
    lines.push(format!("tool timeout: {}s", tools.timeout.as_secs()));
    lines
}
