use crate::backend::{LedgerBackend, LedgerDocument};
use olivaw_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Ledger stored as a single YAML document on local disk.
///
/// Single-writer: the write itself is atomic and serialized through a lock
/// file, but a concurrent read-modify-write from another process can still
/// overwrite this one's changes.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

impl LedgerBackend for FileBackend {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&mut self) -> Result<LedgerDocument> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no ledger file, starting empty");
            return Ok(LedgerDocument::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        LedgerDocument::from_yaml(&content)
    }

    fn store(&mut self, doc: &LedgerDocument, message: &str) -> Result<()> {
        let yaml = doc.to_yaml()?;
        let _lock = olivaw_store::lock_file(&self.lock_path())
            .map_err(|e| Error::Storage(format!("locking {}: {e}", self.path.display())))?;
        olivaw_store::write_atomic(&self.path, yaml.as_bytes())
            .map_err(|e| Error::Storage(format!("writing {}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), %message, "ledger saved");
        Ok(())
    }
}
