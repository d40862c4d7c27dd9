use clap::Subcommand;
use olivaw_core::Settings;
use olivaw_ledger::OlivawPaths;
use serde_json::{Map, Value};
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Dotted key (e.g. pipelines.rift.environment)
        key: String,
        /// Config value (true/false/number/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Dotted key
        key: String,
    },
    /// List all project config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, project_root: &Path) -> anyhow::Result<()> {
    let paths = OlivawPaths::discover(project_root);
    if !paths.is_initialized() {
        anyhow::bail!("No .olivaw/ project found. Run `olivaw init` first.");
    }
    match cmd {
        ConfigCmd::Set { key, value } => set(&paths, &key, &value),
        ConfigCmd::Get { key } => get(&paths, &key),
        ConfigCmd::List => list(&paths),
    }
}

// ── Command Implementations ──

/// Read `.olivaw/config.json`. Returns an empty map if the file doesn't exist.
fn read_config(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} is not a JSON object", path.display()),
    }
}

/// Parse a string value into an appropriate JSON value (bool/number/string).
fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                Value::String(s.to_string())
            }
        }
    }
}

fn set_dotted(config: &mut Map<String, Value>, key: &str, value: Value) -> anyhow::Result<()> {
    let mut parts = key.split('.').peekable();
    let mut node = config;
    while let Some(part) = parts.next() {
        if part.is_empty() {
            anyhow::bail!("malformed key \"{key}\"");
        }
        if parts.peek().is_none() {
            node.insert(part.to_string(), value);
            return Ok(());
        }
        let child = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match child {
            Value::Object(map) => map,
            _ => anyhow::bail!("\"{part}\" in \"{key}\" is not a section"),
        };
    }
    anyhow::bail!("empty key")
}

fn get_dotted<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut value = config.get(parts.next()?)?;
    for part in parts {
        value = value.as_object()?.get(part)?;
    }
    Some(value)
}

fn flatten(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (k, v) in map {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            Value::Object(child) => flatten(&key, child, out),
            other => out.push((key, other.to_string())),
        }
    }
}

/// `olivaw config set <key> <value>`
fn set(paths: &OlivawPaths, key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = read_config(&paths.config_json)?;
    set_dotted(&mut config, key, parse_value(value))?;
    // Refuse values the settings loader would reject.
    serde_json::from_value::<Settings>(Value::Object(config.clone()))
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?;
    let json = serde_json::to_string_pretty(&config)?;
    olivaw_store::write_atomic(&paths.config_json, json.as_bytes())?;
    println!("{key} = {value}");
    Ok(())
}

/// `olivaw config get <key>`
fn get(paths: &OlivawPaths, key: &str) -> anyhow::Result<()> {
    let config = read_config(&paths.config_json)?;
    match get_dotted(&config, key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `olivaw config list`
fn list(paths: &OlivawPaths) -> anyhow::Result<()> {
    let config = read_config(&paths.config_json)?;
    let mut entries = Vec::new();
    flatten("", &config, &mut entries);
    if entries.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in entries {
            println!("{k} = {v}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_types() {
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("60"), serde_json::json!(60));
        assert_eq!(parse_value("/envs/rift"), serde_json::json!("/envs/rift"));
    }

    #[test]
    fn dotted_set_and_get() {
        let mut config = Map::new();
        set_dotted(&mut config, "pipelines.rift.timeout_sec", parse_value("60")).unwrap();
        set_dotted(&mut config, "pipelines.rift.environment", parse_value("/envs/rift")).unwrap();
        assert_eq!(
            get_dotted(&config, "pipelines.rift.timeout_sec"),
            Some(&serde_json::json!(60))
        );
        assert_eq!(get_dotted(&config, "pipelines.bilby"), None);

        let mut entries = Vec::new();
        flatten("", &config, &mut entries);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "pipelines.rift.environment");
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut config = Map::new();
        set_dotted(&mut config, "condor", parse_value("x")).unwrap();
        assert!(set_dotted(&mut config, "condor.user", parse_value("y")).is_err());
        assert!(set_dotted(&mut config, "a..b", parse_value("y")).is_err());
    }

    #[test]
    fn set_rejects_invalid_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = OlivawPaths::discover(tmp.path());
        paths.ensure_layout().unwrap();
        assert!(set(&paths, "ledger.engine", "svn").is_err());
        set(&paths, "ledger.engine", "git").unwrap();
        get(&paths, "ledger.engine").unwrap();
        assert!(paths.load_settings().unwrap().ledger.engine == olivaw_core::settings::LedgerEngine::Git);
    }
}
