//! Git operations on an event's working repository.

use crate::process::{self, CommandSpec, ProcessOutput, SuccessRule};
use std::path::{Path, PathBuf};

/// The working repository an adapter adds its inputs to.
pub struct WorkingRepository {
    dir: PathBuf,
    timeout_sec: u64,
}

impl WorkingRepository {
    pub fn new(dir: impl Into<PathBuf>, timeout_sec: u64) -> Self {
        Self {
            dir: dir.into(),
            timeout_sec,
        }
    }

    async fn git(&self, args: &[&str]) -> ProcessOutput {
        let spec = CommandSpec::new("git")
            .args(args.iter().copied())
            .current_dir(&self.dir)
            .timeout_sec(self.timeout_sec);
        process::run(&spec).await
    }

    async fn git_ok(&self, args: &[&str]) -> Result<ProcessOutput, ProcessOutput> {
        let out = self.git(args).await;
        if out.satisfies(&[SuccessRule::ExitZero]) {
            Ok(out)
        } else {
            Err(out)
        }
    }

    /// First configured remote, if any.
    pub async fn remote(&self) -> Result<Option<String>, ProcessOutput> {
        let out = self.git_ok(&["remote"]).await?;
        Ok(out.stdout.lines().next().map(|l| l.trim().to_string()))
    }

    /// Stage `paths` and commit exactly those paths. Returns `false` when the
    /// paths carry no change.
    pub async fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<bool, ProcessOutput> {
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let path_args = || paths.iter().map(String::as_str);

        let mut add = vec!["add", "--"];
        add.extend(path_args());
        self.git_ok(&add).await?;

        let mut diff = vec!["diff", "--cached", "--quiet", "--"];
        diff.extend(path_args());
        if self.git(&diff).await.exit_code == Some(0) {
            tracing::debug!(repo = %self.dir.display(), "nothing to commit");
            return Ok(false);
        }

        let mut commit = vec!["commit", "--quiet", "-m", message, "--"];
        commit.extend(path_args());
        self.git_ok(&commit).await?;
        tracing::info!(repo = %self.dir.display(), %message, "committed");
        Ok(true)
    }

    /// Whether `path` is in the index.
    pub async fn is_tracked(&self, path: &Path) -> Result<bool, ProcessOutput> {
        let path = path.display().to_string();
        let out = self.git_ok(&["ls-files", "--", &path]).await?;
        Ok(!out.stdout.trim().is_empty())
    }

    /// Push the current branch when a remote exists and it holds commits the
    /// remote has not seen. Returns whether it pushed.
    pub async fn push_if_ahead(&self) -> Result<bool, ProcessOutput> {
        let Some(remote) = self.remote().await? else {
            return Ok(false);
        };
        let branch = self
            .git_ok(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .stdout
            .trim()
            .to_string();
        let tracking = format!("refs/remotes/{remote}/{branch}");
        let known = self
            .git(&["rev-parse", "--verify", "--quiet", &tracking])
            .await
            .exit_code
            == Some(0);
        if known {
            let range = format!("{tracking}..HEAD");
            let ahead = self.git_ok(&["rev-list", "--count", &range]).await?;
            if ahead.stdout.trim() == "0" {
                tracing::debug!(repo = %self.dir.display(), %remote, "up to date");
                return Ok(false);
            }
        }
        self.git_ok(&["push", "--quiet", &remote, "HEAD"]).await?;
        tracing::info!(repo = %self.dir.display(), %remote, %branch, "pushed");
        Ok(true)
    }
}
