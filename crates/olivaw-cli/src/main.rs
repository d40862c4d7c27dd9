mod cmd_apply;
mod cmd_build;
mod cmd_config;
mod cmd_init;
mod cmd_production;
mod cmd_report;

use clap::{Parser, Subcommand};
use olivaw_core::Settings;
use olivaw_ledger::{Ledger, OlivawPaths};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "olivaw", version, about = "Production ledger and pipeline supervisor")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .olivaw/ project in the current directory
    Init {
        /// Project name recorded in the ledger
        #[arg(long)]
        name: Option<String>,
        /// Ledger engine: yamlfile or git
        #[arg(long, default_value = "yamlfile")]
        engine: String,
    },
    /// Apply a stream of event and analysis documents to the ledger
    Apply {
        /// Path or http(s) URL of a multi-document YAML file
        #[arg(short, long)]
        file: String,
        /// Event that analysis documents without an `event` key belong to
        #[arg(short, long)]
        event: Option<String>,
    },
    /// Read-only views of the ledger
    Report {
        #[command(subcommand)]
        cmd: cmd_report::ReportCmd,
    },
    /// Build and submit every eligible production of an event
    Build {
        /// Event name
        event: String,
        /// Build only this production
        #[arg(long)]
        production: Option<String>,
        /// Accounting user for the scheduler
        #[arg(long)]
        user: Option<String>,
        /// Scheduler queue, overriding all other configuration
        #[arg(long)]
        queue: Option<String>,
    },
    /// Operate on a single production
    Production {
        #[command(subcommand)]
        cmd: cmd_production::ProductionCmd,
    },
    /// Read or change project settings (.olivaw/config.json)
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

/// Project root: the nearest ancestor holding `.olivaw/`, else `cwd`.
fn project_root(cwd: PathBuf) -> PathBuf {
    OlivawPaths::find_root(&cwd).unwrap_or(cwd)
}

/// Settings and ledger of an initialized project.
pub(crate) fn open_project(
    project_root: &Path,
) -> anyhow::Result<(OlivawPaths, Settings, Ledger)> {
    let paths = OlivawPaths::discover(project_root);
    if !paths.is_initialized() {
        anyhow::bail!("No .olivaw/ project found. Run `olivaw init` first.");
    }
    let settings = paths.load_settings()?;
    let ledger = Ledger::from_settings(&paths, &settings)?;
    Ok((paths, settings, ledger))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("OLIVAW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.cmd {
        Command::Init { name, engine } => cmd_init::execute(&cwd, name.as_deref(), &engine),
        Command::Apply { file, event } => {
            cmd_apply::execute(&project_root(cwd), &file, event.as_deref())
        }
        Command::Report { cmd } => cmd_report::run(cmd, &project_root(cwd)),
        Command::Build {
            event,
            production,
            user,
            queue,
        } => cmd_build::execute(cmd_build::BuildParams {
            project_root: &project_root(cwd),
            event: &event,
            production: production.as_deref(),
            user,
            queue,
        }),
        Command::Production { cmd } => cmd_production::run(cmd, &project_root(cwd)),
        Command::Config { cmd } => cmd_config::run(cmd, &project_root(cwd)),
    }
}
