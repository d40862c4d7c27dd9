use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Runtime settings, assembled from layered `config.json` files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub condor: CondorSettings,
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineSettings>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEngine {
    #[default]
    Yamlfile,
    Git,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSettings {
    #[serde(default)]
    pub engine: LedgerEngine,
    /// Ledger file; relative paths are taken from the project root.
    #[serde(default = "default_ledger_location")]
    pub location: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            engine: LedgerEngine::default(),
            location: default_ledger_location(),
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneralSettings {
    /// Root under which `<event>/<production>` run directories are derived.
    #[serde(default)]
    pub rundir_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CondorSettings {
    /// Default accounting user.
    #[serde(default)]
    pub user: Option<String>,
}

/// Per-pipeline knobs, keyed by lowercase pipeline identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Virtual environment holding the pipeline's tools.
    #[serde(default)]
    pub environment: Option<PathBuf>,
    /// Executable overrides: tool name → path.
    #[serde(default)]
    pub executables: BTreeMap<String, String>,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            environment: None,
            executables: BTreeMap::new(),
            timeout_sec: default_timeout_sec(),
        }
    }
}

impl PipelineSettings {
    /// Configured path for `tool`, or the bare tool name.
    pub fn executable(&self, tool: &str) -> String {
        self.executables
            .get(tool)
            .cloned()
            .unwrap_or_else(|| tool.to_string())
    }
}

fn default_ledger_location() -> PathBuf {
    PathBuf::from(".olivaw/ledger.yml")
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "master".into()
}
fn default_timeout_sec() -> u64 {
    1800
}

impl Settings {
    /// Load and merge `layers` in order; later files override earlier ones
    /// object-by-object. Missing files are skipped.
    pub fn load(layers: &[PathBuf]) -> Result<Self> {
        let mut merged = serde_json::Value::Object(serde_json::Map::new());
        for path in layers {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            let val: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
                Error::Configuration(format!("invalid settings file {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "settings layer");
            merge_json(&mut merged, val);
        }
        serde_json::from_value(merged)
            .map_err(|e| Error::Configuration(format!("invalid settings: {e}")))
    }

    /// Settings for `pipeline`, defaults when the section is absent.
    pub fn pipeline(&self, pipeline: &str) -> PipelineSettings {
        self.pipelines
            .get(&pipeline.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Ledger file path resolved against `project_root`.
    pub fn ledger_path(&self, project_root: &Path) -> PathBuf {
        if self.ledger.location.is_absolute() {
            self.ledger.location.clone()
        } else {
            project_root.join(&self.ledger.location)
        }
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(b), serde_json::Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_files() {
        let s = Settings::load(&[]).unwrap();
        assert_eq!(s.ledger.engine, LedgerEngine::Yamlfile);
        assert_eq!(s.ledger.location, PathBuf::from(".olivaw/ledger.yml"));
        assert_eq!(s.pipeline("rift").timeout_sec, 1800);
        assert_eq!(s.pipeline("rift").executable("convert_psd_ascii2xml"), "convert_psd_ascii2xml");
    }

    #[test]
    fn later_layers_override() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.json");
        let project = dir.path().join("project.json");
        std::fs::write(
            &user,
            r#"{"condor": {"user": "albert.einstein"}, "pipelines": {"rift": {"environment": "/envs/rift", "timeout_sec": 60}}}"#,
        )
        .unwrap();
        std::fs::write(
            &project,
            r#"{"ledger": {"engine": "git"}, "pipelines": {"rift": {"timeout_sec": 90}}}"#,
        )
        .unwrap();

        let s = Settings::load(&[user, dir.path().join("missing.json"), project]).unwrap();
        assert_eq!(s.ledger.engine, LedgerEngine::Git);
        assert_eq!(s.condor.user.as_deref(), Some("albert.einstein"));
        let rift = s.pipeline("RIFT");
        assert_eq!(rift.environment, Some(PathBuf::from("/envs/rift")));
        assert_eq!(rift.timeout_sec, 90);
    }

    #[test]
    fn malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Settings::load(&[path]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn ledger_path_relative_to_root() {
        let s = Settings::default();
        assert_eq!(
            s.ledger_path(Path::new("/proj")),
            PathBuf::from("/proj/.olivaw/ledger.yml")
        );
    }
}
