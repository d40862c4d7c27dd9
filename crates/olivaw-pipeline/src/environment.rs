use crate::process::{self, CommandSpec, SuccessRule};
use olivaw_core::{Error, Production, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An activated tool environment: the variables every tool run inherits.
#[derive(Debug, Clone, Default)]
pub struct RuntimeEnvironment {
    pub root: Option<PathBuf>,
    pub vars: Vec<(String, String)>,
}

impl RuntimeEnvironment {
    /// The ambient process environment, used when no environment is configured.
    pub fn inherited() -> Self {
        Self::default()
    }

    /// Source `<root>/bin/activate` in `sh` and capture the environment it
    /// leaves behind.
    ///
    /// A failure is an [`Error::Environment`] carrying the activation command
    /// and whatever it printed. `<root>/bin` always leads `PATH` and
    /// `VIRTUAL_ENV` defaults to `root`.
    pub async fn activate(
        root: Option<&Path>,
        production: &Production,
        issue: Option<u64>,
        timeout_sec: u64,
    ) -> Result<Self> {
        let Some(root) = root else {
            tracing::debug!(production = %production.qualified_name(), "no environment configured");
            return Ok(Self::inherited());
        };

        let script = root.join("bin").join("activate");
        let source = format!(". '{}' >/dev/null && env -0", script.display());
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg(&source)
            .timeout_sec(timeout_sec);
        let out = process::run(&spec).await;
        if !out.satisfies(&[SuccessRule::ExitZero, SuccessRule::EmptyStderr]) {
            return Err(Error::Environment {
                production: production.qualified_name(),
                command: out.command.clone(),
                output: out.combined(),
                issue,
            });
        }

        let mut vars = parse_env(&out.stdout);
        let bin = root.join("bin");
        let path = match vars.get("PATH") {
            Some(existing) => {
                let mut dirs: Vec<PathBuf> = std::env::split_paths(existing).collect();
                if dirs.first() != Some(&bin) {
                    dirs.insert(0, bin.clone());
                }
                std::env::join_paths(dirs)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|_| bin.display().to_string())
            }
            None => bin.display().to_string(),
        };
        vars.insert("PATH".to_string(), path);
        vars.entry("VIRTUAL_ENV".to_string())
            .or_insert_with(|| root.display().to_string());

        tracing::info!(
            production = %production.qualified_name(),
            env = %root.display(),
            vars = vars.len(),
            "environment activated"
        );
        Ok(Self {
            root: Some(root.to_path_buf()),
            vars: vars.into_iter().collect(),
        })
    }
}

/// Shell bookkeeping that must not follow the tool into its own directory.
const SHELL_LOCAL: [&str; 4] = ["PWD", "OLDPWD", "SHLVL", "_"];

/// Parse `env -0` output into variables.
fn parse_env(raw: &str) -> BTreeMap<String, String> {
    raw.split('\0')
        .filter_map(|entry| entry.split_once('='))
        .filter(|(k, _)| !k.is_empty() && !SHELL_LOCAL.contains(k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
