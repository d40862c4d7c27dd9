use olivaw_core::Error;
use olivaw_ledger::{apply_documents, parse_documents, read_source};
use std::io::{BufRead, Write};
use std::path::Path;

pub fn execute(project_root: &Path, source: &str, event: Option<&str>) -> anyhow::Result<()> {
    let (paths, _settings, mut ledger) = crate::open_project(project_root)?;
    let _lock = olivaw_store::try_lock_file(&paths.lock_file)?;

    let data = read_source(source)?;
    let docs = parse_documents(&data)?;
    let report = apply_documents(&mut ledger, docs, event, prompt_event)?;

    for name in &report.events {
        println!("event {name} applied");
    }
    for name in &report.analyses {
        println!("analysis {name} added");
    }
    if report.events.is_empty() && report.analyses.is_empty() {
        println!("(nothing to apply)");
    }
    Ok(())
}

/// Ask on stdin which event unnamed analyses belong to.
fn prompt_event() -> olivaw_core::Result<String> {
    print!("Which event should these analyses be applied to? ");
    std::io::stdout()
        .flush()
        .map_err(|e| Error::io("<stdout>", e))?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| Error::io("<stdin>", e))?;
    let answer = answer.trim().to_string();
    if answer.is_empty() {
        return Err(Error::Configuration("no event given for analysis documents".into()));
    }
    Ok(answer)
}
