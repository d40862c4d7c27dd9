//! Error taxonomy shared by the ledger, the resolver and the pipeline adapters.

use std::path::PathBuf;

use crate::status::Status;

/// The result type used throughout Olivaw.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by ledger, resolver and pipeline operations.
///
/// Nothing in the library retries on any of these; they are always handed
/// back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown pipeline, unresolved dependency, dependency cycle, duplicate
    /// production, missing required metadata or a malformed document.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The runtime environment of an external tool could not be activated.
    #[error("environment for {production} could not be activated\n{command}\n{output}")]
    Environment {
        /// Production whose build was attempted.
        production: String,
        /// Command used to activate the environment.
        command: String,
        /// Captured stdout and stderr of the activation.
        output: String,
        /// Issue-tracker reference of the owning event, if any.
        issue: Option<u64>,
    },

    /// The external tool ran but did not report success.
    #[error("build failed for {production} (exit {exit_code:?})\n{command}\n{stdout}\n\n{stderr}")]
    BuildFailure {
        /// Production whose build was attempted.
        production: String,
        /// Full command line of the external tool.
        command: String,
        /// Exit code, `None` when killed or timed out.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
        /// Issue-tracker reference of the owning event, if any.
        issue: Option<u64>,
    },

    /// The repository-backed ledger found remote state newer than its last pull.
    #[error("ledger out of sync with remote: {0}")]
    LedgerSync(String),

    /// A status change not permitted for the requesting actor.
    #[error("invalid status transition for {production}: {from} -> {to}")]
    InvalidTransition {
        production: String,
        from: Status,
        to: Status,
    },

    /// A backend failure that is not a divergence (git plumbing, HTTP fetch).
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A build failed and the `stuck` status could not be persisted either.
    /// The ledger still holds the pre-build status; reload before retrying.
    #[error("{build}\n{production} could not be recorded as stuck: {persist}")]
    Unrecorded {
        production: String,
        build: Box<Error>,
        persist: Box<Error>,
    },
}

impl Error {
    /// Build an `Io` error bound to the path that failed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the production must be marked `stuck`.
    pub fn marks_stuck(&self) -> bool {
        match self {
            Error::Environment { .. } | Error::BuildFailure { .. } => true,
            Error::Unrecorded { build, .. } => build.marks_stuck(),
            _ => false,
        }
    }

    /// Issue-tracker reference carried by the error, if any.
    pub fn issue(&self) -> Option<u64> {
        match self {
            Error::Environment { issue, .. } | Error::BuildFailure { issue, .. } => *issue,
            Error::Unrecorded { build, .. } => build.issue(),
            _ => None,
        }
    }
}
