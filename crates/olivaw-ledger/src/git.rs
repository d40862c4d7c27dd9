use crate::backend::{LedgerBackend, LedgerDocument};
use crate::file::FileBackend;
use olivaw_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Ledger stored as a YAML file inside a git clone.
///
/// `load` fetches and fast-forwards first. `store` refuses to write when the
/// remote branch moved since the last load, and publishes each change as one
/// commit pushed to the remote. Concurrency is optimistic: a caller seeing
/// [`Error::LedgerSync`] must reload and retry.
pub struct GitBackend {
    file: FileBackend,
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    /// Remote branch head observed at the last load or store.
    base: Option<String>,
}

impl GitBackend {
    /// `ledger_file` must live inside a git working copy with `remote` configured.
    pub fn new(ledger_file: impl Into<PathBuf>, remote: &str, branch: &str) -> Result<Self> {
        let ledger_file = ledger_file.into();
        let parent = ledger_file
            .parent()
            .ok_or_else(|| Error::Configuration("ledger file has no parent directory".into()))?
            .to_path_buf();
        std::fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;
        let top = run_git(&parent, &["rev-parse", "--show-toplevel"])?;
        Ok(Self {
            file: FileBackend::new(ledger_file),
            repo_dir: PathBuf::from(top.trim()),
            remote: remote.to_string(),
            branch: branch.to_string(),
            base: None,
        })
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn remote_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    fn fetch(&self) -> Result<()> {
        run_git(&self.repo_dir, &["fetch", "--quiet", &self.remote])?;
        Ok(())
    }

    /// Current remote branch head, `None` when the branch does not exist yet.
    fn remote_head(&self) -> Result<Option<String>> {
        rev_parse(&self.repo_dir, &self.remote_ref())
    }

    fn local_head(&self) -> Result<Option<String>> {
        rev_parse(&self.repo_dir, "HEAD")
    }

    fn relative_ledger_path(&self) -> Result<PathBuf> {
        let path = self.file.path();
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::io(path, e))?
                .join(path)
        };
        let canon_repo = self
            .repo_dir
            .canonicalize()
            .map_err(|e| Error::io(&self.repo_dir, e))?;
        let canon_parent = abs
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .unwrap_or_else(|| abs.clone());
        let rel_parent = canon_parent
            .strip_prefix(&canon_repo)
            .map_err(|_| {
                Error::Configuration(format!(
                    "ledger file {} is outside repository {}",
                    path.display(),
                    self.repo_dir.display()
                ))
            })?
            .to_path_buf();
        let name = abs
            .file_name()
            .ok_or_else(|| Error::Configuration("ledger file has no name".into()))?;
        Ok(rel_parent.join(name))
    }

    /// Stage, commit and push the ledger file already written to `rel`.
    fn publish(&self, rel: &str, message: &str) -> Result<bool> {
        run_git(&self.repo_dir, &["add", "--", rel])?;

        let staged = Command::new("git")
            .args(["diff", "--cached", "--quiet", "--", rel])
            .current_dir(&self.repo_dir)
            .status()
            .map_err(|e| Error::Storage(format!("git not available: {e}")))?;
        if staged.success() {
            tracing::debug!("ledger unchanged, nothing to commit");
            return Ok(false);
        }

        run_git(&self.repo_dir, &["commit", "--quiet", "-m", message, "--", rel])?;
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        if let Err(e) = run_git(&self.repo_dir, &["push", "--quiet", &self.remote, &refspec]) {
            let text = e.to_string();
            if text.contains("rejected") || text.contains("non-fast-forward") || text.contains("fetch first") {
                return Err(Error::LedgerSync(text));
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Put the clone back to `previous`, dropping whatever an unpublished
    /// store left in the working tree, index or history.
    fn rollback(&self, previous: Option<&str>, rel: &str) {
        let result = match previous {
            Some(rev) => run_git(&self.repo_dir, &["reset", "--hard", "--quiet", rev]).map(drop),
            None => self.rollback_to_empty(rel),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not roll back unpublished ledger change");
        }
    }

    fn rollback_to_empty(&self, rel: &str) -> Result<()> {
        if self.local_head()?.is_some() {
            run_git(&self.repo_dir, &["update-ref", "-d", "HEAD"])?;
        }
        run_git(
            &self.repo_dir,
            &["rm", "--cached", "--quiet", "--ignore-unmatch", "--", rel],
        )?;
        let path = self.repo_dir.join(rel);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

impl LedgerBackend for GitBackend {
    fn describe(&self) -> String {
        format!(
            "{} ({}/{})",
            self.file.path().display(),
            self.remote,
            self.branch
        )
    }

    fn load(&mut self) -> Result<LedgerDocument> {
        self.fetch()?;
        let remote = self.remote_head()?;
        if let Some(rev) = &remote {
            run_git(&self.repo_dir, &["merge", "--ff-only", "--quiet", rev]).map_err(|e| {
                Error::LedgerSync(format!("cannot fast-forward to {}: {e}", self.remote_ref()))
            })?;
        }
        tracing::info!(remote = ?remote, repo = %self.repo_dir.display(), "ledger pulled");
        self.base = remote;
        self.file.load()
    }

    fn store(&mut self, doc: &LedgerDocument, message: &str) -> Result<()> {
        self.fetch()?;
        let remote = self.remote_head()?;
        if remote != self.base {
            return Err(Error::LedgerSync(format!(
                "{} moved from {} to {} since the last pull",
                self.remote_ref(),
                self.base.as_deref().unwrap_or("(none)"),
                remote.as_deref().unwrap_or("(none)")
            )));
        }

        let previous = self.local_head()?;
        let rel = self.relative_ledger_path()?;
        let rel_str = rel.to_string_lossy().to_string();
        self.file.store(doc, message)?;
        match self.publish(&rel_str, message) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                self.rollback(previous.as_deref(), &rel_str);
                return Err(e);
            }
        }

        self.base = self.local_head()?;
        tracing::info!(commit = ?self.base, %message, "ledger pushed");
        Ok(())
    }
}

fn rev_parse(dir: &Path, rev: &str) -> Result<Option<String>> {
    let out = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", rev])
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Storage(format!("git not available: {e}")))?;
    if out.status.success() {
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    } else {
        Ok(None)
    }
}

/// Run a git command in `dir`, returning stdout or a `Storage` error with stderr.
pub(crate) fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Storage(format!("git not available: {e}")))?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    } else {
        Err(Error::Storage(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }
}
