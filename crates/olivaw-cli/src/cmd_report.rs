use clap::Subcommand;
use olivaw_core::{get_all_latest, waiting_on_dependencies, Event};
use std::fmt::Write;
use std::path::{Path, PathBuf};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ReportCmd {
    /// Productions per event, with what is ready and what is blocked
    Status {
        /// Limit to one event
        event: Option<String>,
    },
    /// Dump the ledger as YAML
    Ledger {
        /// Limit to one event
        event: Option<String>,
        /// Write to this file instead of stdout
        #[arg(long)]
        yaml: Option<PathBuf>,
    },
}

// ── Dispatch ──

pub fn run(cmd: ReportCmd, project_root: &Path) -> anyhow::Result<()> {
    let (_paths, _settings, ledger) = crate::open_project(project_root)?;
    match cmd {
        ReportCmd::Status { event } => {
            let selected = select(ledger.events(), event.as_deref())?;
            if !ledger.project_name().is_empty() {
                println!("project: {}", ledger.project_name());
            }
            print!("{}", render_status(&selected, ledger.events())?);
        }
        ReportCmd::Ledger { event, yaml } => {
            let selected = select(ledger.events(), event.as_deref())?;
            let out = serde_yaml::to_string(&selected)?;
            match yaml {
                Some(path) => {
                    olivaw_store::write_atomic(&path, out.as_bytes())?;
                    println!("wrote {} event(s) to {}", selected.len(), path.display());
                }
                None => print!("{out}"),
            }
        }
    }
    Ok(())
}

fn select<'a>(events: &'a [Event], name: Option<&str>) -> anyhow::Result<Vec<&'a Event>> {
    match name {
        Some(n) => {
            let found: Vec<&Event> = events.iter().filter(|e| e.name == n).collect();
            if found.is_empty() {
                anyhow::bail!("event \"{n}\" not found in the ledger");
            }
            Ok(found)
        }
        None => Ok(events.iter().collect()),
    }
}

// ── Rendering ──

fn render_status(selected: &[&Event], all: &[Event]) -> anyhow::Result<String> {
    let mut out = String::new();
    if selected.is_empty() {
        out.push_str("(ledger is empty)\n");
        return Ok(out);
    }
    for event in selected {
        writeln!(out, "{}", event.name)?;
        if event.productions().is_empty() {
            writeln!(out, "  (no productions)")?;
            continue;
        }
        let width = event
            .productions()
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(0);
        for p in event.productions() {
            writeln!(out, "  {:<width$}  {:<10} {}", p.name, p.pipeline, p.status)?;
        }

        let ready = get_all_latest(event, all)?;
        if !ready.is_empty() {
            let names: Vec<&str> = ready.iter().map(|p| p.name.as_str()).collect();
            writeln!(out, "  ready to run: {}", names.join(", "))?;
        }
        for p in waiting_on_dependencies(event, all)? {
            writeln!(out, "  waiting: {} (needs {})", p.name, p.needs.join(", "))?;
        }
    }
    Ok(out)
}
