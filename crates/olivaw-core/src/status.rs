use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ── Status enum ──

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Wait,
    Ready,
    Running,
    Processing,
    Finished,
    Uploaded,
    Stuck,
    Restart,
    Stop,
    Stopped,
    Manual,
    Cancelled,
}

/// Who is requesting a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A pipeline adapter building or submitting a job.
    Pipeline,
    /// The external process watching the batch scheduler.
    Observer,
    /// A human operator.
    Operator,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::Wait,
        Status::Ready,
        Status::Running,
        Status::Processing,
        Status::Finished,
        Status::Uploaded,
        Status::Stuck,
        Status::Restart,
        Status::Stop,
        Status::Stopped,
        Status::Manual,
        Status::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Wait => "wait",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Processing => "processing",
            Status::Finished => "finished",
            Status::Uploaded => "uploaded",
            Status::Stuck => "stuck",
            Status::Restart => "restart",
            Status::Stop => "stop",
            Status::Stopped => "stopped",
            Status::Manual => "manual",
            Status::Cancelled => "cancelled",
        }
    }

    /// `finished` or `uploaded`: satisfies a dependency.
    pub fn is_complete(&self) -> bool {
        matches!(self, Status::Finished | Status::Uploaded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Cancelled | Status::Stopped | Status::Uploaded)
    }

    /// States a pipeline failure may move to `stuck`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Status::Wait | Status::Ready | Status::Running | Status::Processing | Status::Restart
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Status::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| Error::Configuration(format!("unknown status: \"{s}\"")))
    }
}

/// Ledger files accept any case, the same as the command line.
impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Actor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Ok(Actor::Pipeline),
            "observer" => Ok(Actor::Observer),
            "operator" => Ok(Actor::Operator),
            _ => Err(Error::Configuration(format!(
                "unknown actor: \"{s}\". Valid actors: pipeline, observer, operator"
            ))),
        }
    }
}

// ── Valid transitions ──

const PIPELINE_TRANSITIONS: &[(Status, &[Status])] = &[
    (Status::Wait, &[Status::Ready, Status::Stuck]),
    (Status::Ready, &[Status::Running, Status::Stuck]),
    (Status::Running, &[Status::Stuck]),
    (Status::Processing, &[Status::Stuck]),
    (Status::Restart, &[Status::Stuck]),
];

const OBSERVER_TRANSITIONS: &[(Status, &[Status])] = &[
    (Status::Running, &[Status::Processing]),
    (Status::Processing, &[Status::Finished]),
    (Status::Finished, &[Status::Uploaded]),
];

const OPERATOR_TRANSITIONS: &[(Status, &[Status])] = &[
    (Status::Stuck, &[Status::Restart]),
    (Status::Restart, &[Status::Ready]),
    (Status::Stop, &[Status::Stopped]),
    // reopen
    (Status::Stopped, &[Status::Wait]),
    (Status::Manual, &[Status::Wait]),
];

/// Whether `actor` may move a production from `from` to `to`.
pub fn is_valid_transition(from: Status, to: Status, actor: Actor) -> bool {
    let table = match actor {
        Actor::Pipeline => PIPELINE_TRANSITIONS,
        Actor::Observer => OBSERVER_TRANSITIONS,
        Actor::Operator => {
            // Halting is available from every non-terminal state.
            if matches!(to, Status::Stop | Status::Manual | Status::Cancelled)
                && !from.is_terminal()
                && from != to
            {
                return true;
            }
            OPERATOR_TRANSITIONS
        }
    };
    table
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_status_is_case_insensitive() {
        let st: Status = serde_yaml::from_str("Finished").unwrap();
        assert_eq!(st, Status::Finished);
        assert_eq!(st, "FINISHED".parse::<Status>().unwrap());
        assert_eq!(serde_yaml::to_string(&st).unwrap().trim(), "finished");
        assert!(serde_yaml::from_str::<Status>("done").is_err());
    }

    #[test]
    fn actor_parses_case_insensitively() {
        assert_eq!("Operator".parse::<Actor>().unwrap(), Actor::Operator);
        assert_eq!("observer".parse::<Actor>().unwrap(), Actor::Observer);
        assert!("scheduler".parse::<Actor>().is_err());
    }

    #[test]
    fn pipeline_drives_wait_ready_running() {
        assert!(is_valid_transition(Status::Wait, Status::Ready, Actor::Pipeline));
        assert!(is_valid_transition(Status::Ready, Status::Running, Actor::Pipeline));
        assert!(!is_valid_transition(Status::Running, Status::Finished, Actor::Pipeline));
    }

    #[test]
    fn pipeline_may_mark_any_active_state_stuck() {
        for from in Status::ALL.iter().filter(|s| s.is_active()) {
            assert!(
                is_valid_transition(*from, Status::Stuck, Actor::Pipeline),
                "{from} -> stuck"
            );
        }
        assert!(!is_valid_transition(Status::Finished, Status::Stuck, Actor::Pipeline));
    }

    #[test]
    fn observer_chain() {
        assert!(is_valid_transition(Status::Running, Status::Processing, Actor::Observer));
        assert!(is_valid_transition(Status::Processing, Status::Finished, Actor::Observer));
        assert!(is_valid_transition(Status::Finished, Status::Uploaded, Actor::Observer));
        assert!(!is_valid_transition(Status::Wait, Status::Running, Actor::Observer));
    }

    #[test]
    fn operator_restart_cycle() {
        assert!(is_valid_transition(Status::Stuck, Status::Restart, Actor::Operator));
        assert!(is_valid_transition(Status::Restart, Status::Ready, Actor::Operator));
        assert!(!is_valid_transition(Status::Stuck, Status::Ready, Actor::Operator));
    }

    #[test]
    fn terminal_states_cannot_be_halted() {
        assert!(is_valid_transition(Status::Running, Status::Stop, Actor::Operator));
        assert!(is_valid_transition(Status::Wait, Status::Cancelled, Actor::Operator));
        assert!(!is_valid_transition(Status::Cancelled, Status::Manual, Actor::Operator));
        assert!(!is_valid_transition(Status::Uploaded, Status::Stop, Actor::Operator));
        assert!(!is_valid_transition(Status::Cancelled, Status::Wait, Actor::Operator));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Finished".parse::<Status>().unwrap(), Status::Finished);
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let yaml = serde_yaml::to_string(&Status::Processing).unwrap();
        assert_eq!(yaml.trim(), "processing");
        let back: Status = serde_yaml::from_str("stuck").unwrap();
        assert_eq!(back, Status::Stuck);
    }
}
