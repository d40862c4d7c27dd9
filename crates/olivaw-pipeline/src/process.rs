//! External tool invocation with structured results.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// An argv invocation of an external tool.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(1800),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, envs: &[(String, String)]) -> Self {
        self.envs.extend(envs.iter().cloned());
        self
    }

    pub fn timeout_sec(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Command line as a single display string.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of one tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub command: String,
    /// `None` when the process was killed, timed out or never spawned.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// One condition a run must meet to count as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessRule {
    ExitZero,
    EmptyStderr,
    StdoutContains(&'static str),
}

impl ProcessOutput {
    /// Rules the run broke, as human-readable reasons. Empty means success.
    pub fn violations(&self, rules: &[SuccessRule]) -> Vec<String> {
        let mut out = Vec::new();
        for rule in rules {
            match rule {
                SuccessRule::ExitZero if self.exit_code != Some(0) => {
                    out.push(match (self.timed_out, self.exit_code) {
                        (true, _) => "timed out".to_string(),
                        (false, Some(code)) => format!("exit {code}"),
                        (false, None) => "no exit status".to_string(),
                    });
                }
                SuccessRule::EmptyStderr if !self.stderr.trim().is_empty() => {
                    out.push("stderr not empty".to_string());
                }
                SuccessRule::StdoutContains(marker) if !self.stdout.contains(marker) => {
                    out.push(format!("stdout lacks \"{marker}\""));
                }
                _ => {}
            }
        }
        out
    }

    pub fn satisfies(&self, rules: &[SuccessRule]) -> bool {
        self.violations(rules).is_empty()
    }

    /// stdout and stderr joined for error reports.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
        }
    }
}

/// Run `spec` to completion. Spawn failures and timeouts are reported in the
/// returned output rather than as errors.
pub async fn run(spec: &CommandSpec) -> ProcessOutput {
    let start = Instant::now();
    let command = spec.display();
    tracing::debug!(%command, cwd = ?spec.cwd, "running tool");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in &spec.envs {
        cmd.env(k, v);
    }

    let (exit_code, stdout, stderr, timed_out) =
        match tokio::time::timeout(spec.timeout, cmd.output()).await {
            Ok(Ok(output)) => (
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
                false,
            ),
            Ok(Err(e)) => (None, String::new(), format!("spawn error: {e}"), false),
            Err(_) => (
                None,
                String::new(),
                format!("command timed out after {}s", spec.timeout.as_secs()),
                true,
            ),
        };

    let out = ProcessOutput {
        command,
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration: start.elapsed(),
    };
    tracing::debug!(
        command = %out.command,
        exit_code = ?out.exit_code,
        elapsed_ms = out.duration.as_millis() as u64,
        "tool finished"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let out = run(&sh("echo hello; echo oops >&2; exit 3")).await;
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.combined(), "hello\noops");
    }

    #[tokio::test]
    async fn rules_report_each_violation() {
        let out = run(&sh("echo partial; echo warn >&2")).await;
        let rules = [
            SuccessRule::ExitZero,
            SuccessRule::EmptyStderr,
            SuccessRule::StdoutContains("Successfully created DAG file."),
        ];
        let v = out.violations(&rules);
        assert_eq!(v.len(), 2);
        assert!(v[0].contains("stderr"));
        assert!(v[1].contains("Successfully created DAG file."));
        assert!(!out.satisfies(&rules));
        assert!(out.satisfies(&[SuccessRule::ExitZero]));
    }

    #[tokio::test]
    async fn runs_in_directory_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("pwd; echo $OLIVAW_TEST_VAR")
            .current_dir(dir.path())
            .envs(&[("OLIVAW_TEST_VAR".into(), "set".into())]);
        let out = run(&spec).await;
        let canon = dir.path().canonicalize().unwrap();
        assert!(out.stdout.contains(canon.to_str().unwrap()));
        assert!(out.stdout.contains("set"));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let out = run(&CommandSpec::new("/nonexistent/olivaw-tool")).await;
        assert_eq!(out.exit_code, None);
        assert!(out.stderr.contains("spawn error"));
    }

    #[tokio::test]
    async fn timeout_kills() {
        let out = run(&sh("sleep 60").timeout_sec(1)).await;
        assert!(out.timed_out);
        assert_eq!(out.violations(&[SuccessRule::ExitZero]), vec!["timed out"]);
    }
}
