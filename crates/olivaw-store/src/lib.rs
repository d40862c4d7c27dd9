use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Return the per-user config root.
/// Linux: `~/.config/olivaw/`, macOS: `~/Library/Application Support/olivaw/`,
/// Windows: `%APPDATA%\olivaw\` (falls back to `~/.olivaw/`).
pub fn config_root() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("olivaw")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".olivaw")
    } else {
        PathBuf::from(".olivaw-user")
    }
}

/// Per-user settings file: `config_root/config.json`.
pub fn user_config_path() -> PathBuf {
    config_root().join("config.json")
}

/// Home directory, used as the default run-directory root.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-based exclusive lock guard.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock, blocking until available. Creates the lock file if needed.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

/// Try to acquire an exclusive file lock without blocking.
pub fn try_lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| anyhow::anyhow!("{} is locked by another process", path.display()))?;
    Ok(LockGuard { _file: file })
}
