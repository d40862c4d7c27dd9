use olivaw_pipeline::{BuildOptions, Outcome, Supervisor};
use std::path::Path;

pub struct BuildParams<'a> {
    pub project_root: &'a Path,
    pub event: &'a str,
    pub production: Option<&'a str>,
    pub user: Option<String>,
    pub queue: Option<String>,
}

pub fn execute(params: BuildParams<'_>) -> anyhow::Result<()> {
    let (paths, settings, ledger) = crate::open_project(params.project_root)?;
    let _lock = olivaw_store::try_lock_file(&paths.lock_file)?;
    let mut supervisor = Supervisor::new(ledger, settings);
    let opts = BuildOptions {
        user: params.user,
        queue: params.queue,
    };

    let rt = tokio::runtime::Runtime::new()?;
    match params.production {
        Some(production) => {
            let outcome = rt.block_on(supervisor.submit(params.event, production, &opts))?;
            print_outcome(&outcome);
        }
        None => {
            let advance = rt.block_on(supervisor.advance(params.event, &opts))?;
            if advance.outcomes.is_empty() && advance.failure.is_none() {
                println!("{}: nothing ready to run", params.event);
            }
            for outcome in &advance.outcomes {
                print_outcome(outcome);
            }
            if let Some(issue) = advance.failure.as_ref().and_then(|e| e.issue()) {
                eprintln!("failure reported against issue #{issue}");
            }
            advance.into_result()?;
        }
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    println!("{} -> {}", outcome.production, outcome.status);
    if let Some(issue) = outcome.log.issue {
        println!("  issue #{issue}");
    }
}
