use olivaw_core::{Event, Result};
use serde::{Deserialize, Serialize};

/// Project header stored alongside the events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: String,
}

/// The whole persisted ledger: the unit of durability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub project: ProjectInfo,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl LedgerDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| {
            olivaw_core::Error::Configuration(format!("malformed ledger document: {e}"))
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Persistence strategy behind a [`crate::Ledger`].
///
/// `store` must replace the persisted document as a whole or not at all.
pub trait LedgerBackend: Send {
    /// Short human-readable description (path or remote).
    fn describe(&self) -> String;

    /// Read the latest persisted document. Missing storage is an empty ledger.
    fn load(&mut self) -> Result<LedgerDocument>;

    /// Persist `doc`, with `message` describing the change.
    fn store(&mut self, doc: &LedgerDocument, message: &str) -> Result<()>;
}
