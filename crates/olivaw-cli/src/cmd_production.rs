use clap::Subcommand;
use olivaw_core::{Actor, Status};
use olivaw_pipeline::Supervisor;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProductionCmd {
    /// Change a production's status (restart, stop, reopen, observer updates)
    SetStatus {
        /// Event name
        event: String,
        /// Production name
        production: String,
        /// New status (wait, ready, running, processing, finished, uploaded,
        /// stuck, restart, stop, stopped, manual, cancelled)
        status: String,
        /// Who is making the change: operator, observer or pipeline
        #[arg(long, default_value = "operator")]
        actor: String,
    },
}

pub fn run(cmd: ProductionCmd, project_root: &Path) -> anyhow::Result<()> {
    match cmd {
        ProductionCmd::SetStatus {
            event,
            production,
            status,
            actor,
        } => {
            let status: Status = status.parse()?;
            let actor: Actor = actor.parse()?;
            let (paths, settings, ledger) = crate::open_project(project_root)?;
            let _lock = olivaw_store::try_lock_file(&paths.lock_file)?;
            let mut supervisor = Supervisor::new(ledger, settings);
            supervisor.set_status(&event, &production, status, actor)?;
            println!("{event}/{production} -> {status}");
            Ok(())
        }
    }
}
