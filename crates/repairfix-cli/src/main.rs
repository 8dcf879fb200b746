mod config;
mod dispatch;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::dispatch::run_cli;

const LOG_ENV: &str = "REPAIRFIX_LOG";

#[derive(Parser, Debug)]
#[command(name = "repairfix")]
#[command(about = "Install archive patches into game directories and roll them back", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config.toml in the user prefix).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug details to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    /// Disable status badges and section headers.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Install directory to operate on.
    #[arg(long)]
    target: Option<PathBuf>,
    /// Game identifier from the [games] table of the configuration.
    #[arg(long)]
    game: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Install {
        archive: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        password: Option<String>,
        /// Extract into a staging directory first, then copy into place.
        #[arg(long)]
        staged: bool,
    },
    Uninstall {
        #[command(flatten)]
        target: TargetArgs,
    },
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    List,
    Probe {
        archive: PathBuf,
    },
    Snapshot {
        dir: PathBuf,
    },
    Tools,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
