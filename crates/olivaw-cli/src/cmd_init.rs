use olivaw_ledger::{Ledger, OlivawPaths};
use std::path::Path;

pub fn execute(root: &Path, name: Option<&str>, engine: &str) -> anyhow::Result<()> {
    let engine = engine.to_ascii_lowercase();
    if engine != "yamlfile" && engine != "git" {
        anyhow::bail!("unknown ledger engine \"{engine}\". Valid engines: yamlfile, git");
    }

    let paths = OlivawPaths::discover(root);
    if paths.is_initialized() {
        println!("Already initialized at {}", paths.olivaw_dir.display());
        return Ok(());
    }
    paths.ensure_layout()?;
    let _lock = olivaw_store::try_lock_file(&paths.lock_file)?;

    if !paths.config_json.exists() {
        let config = serde_json::json!({ "ledger": { "engine": engine } });
        olivaw_store::write_atomic(
            &paths.config_json,
            serde_json::to_string_pretty(&config)?.as_bytes(),
        )?;
    }

    let settings = paths.load_settings()?;
    let mut ledger = Ledger::from_settings(&paths, &settings)?;
    let project = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "olivaw".to_string()),
    };
    ledger.set_project_name(&project)?;

    println!("Initialized .olivaw/ for project {project}");
    println!("  ledger: {}", ledger.describe());
    Ok(())
}
