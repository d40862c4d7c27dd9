use olivaw_core::Settings;
use std::path::{Path, PathBuf};

/// All well-known paths under `.olivaw/`.
#[derive(Debug, Clone)]
pub struct OlivawPaths {
    pub root: PathBuf,
    pub olivaw_dir: PathBuf,
    pub config_json: PathBuf,
    pub lock_file: PathBuf,
}

impl OlivawPaths {
    /// Derive all paths from a project root. Pure computation, no I/O.
    pub fn discover(project_root: impl Into<PathBuf>) -> Self {
        let root = project_root.into();
        let olivaw_dir = root.join(".olivaw");
        Self {
            config_json: olivaw_dir.join("config.json"),
            lock_file: olivaw_dir.join("LOCK"),
            olivaw_dir,
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.olivaw_dir)?;
        Ok(())
    }

    /// Check whether `.olivaw/` exists.
    pub fn is_initialized(&self) -> bool {
        self.olivaw_dir.is_dir()
    }

    /// Settings files in increasing precedence: per-user, then project.
    pub fn settings_layers(&self) -> Vec<PathBuf> {
        vec![olivaw_store::user_config_path(), self.config_json.clone()]
    }

    /// Load layered settings for this project.
    pub fn load_settings(&self) -> olivaw_core::Result<Settings> {
        Settings::load(&self.settings_layers())
    }

    /// Walk up from `start` looking for a directory containing `.olivaw/`.
    /// Returns `None` if not found.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(".olivaw").is_dir() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }
}
