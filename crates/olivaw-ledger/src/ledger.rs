use crate::backend::{LedgerBackend, LedgerDocument};
use crate::file::FileBackend;
use crate::git::GitBackend;
use crate::paths::OlivawPaths;
use olivaw_core::settings::LedgerEngine;
use olivaw_core::{Error, Event, Result, Settings};
use std::collections::HashSet;

/// The production ledger: every event, addressable by name.
///
/// Holds one in-memory snapshot. Writes build a candidate snapshot, persist it
/// through the backend, and only then replace the in-memory copy, so a failed
/// write leaves the ledger exactly as it was.
pub struct Ledger {
    backend: Box<dyn LedgerBackend>,
    doc: LedgerDocument,
}

impl Ledger {
    /// Open a ledger over `backend` and load its current state.
    pub fn open(backend: Box<dyn LedgerBackend>) -> Result<Self> {
        let mut ledger = Self {
            backend,
            doc: LedgerDocument::default(),
        };
        ledger.load()?;
        Ok(ledger)
    }

    /// Open the ledger configured for a project.
    pub fn from_settings(paths: &OlivawPaths, settings: &Settings) -> Result<Self> {
        let location = settings.ledger_path(&paths.root);
        let backend: Box<dyn LedgerBackend> = match settings.ledger.engine {
            LedgerEngine::Yamlfile => Box::new(FileBackend::new(location)),
            LedgerEngine::Git => Box::new(GitBackend::new(
                location,
                &settings.ledger.remote,
                &settings.ledger.branch,
            )?),
        };
        Self::open(backend)
    }

    /// Re-read the backend, replacing the in-memory snapshot.
    pub fn load(&mut self) -> Result<&[Event]> {
        let doc = self.backend.load()?;
        check_unique_events(&doc.events)?;
        tracing::info!(
            backend = %self.backend.describe(),
            events = doc.events.len(),
            "ledger loaded"
        );
        self.doc = doc;
        Ok(&self.doc.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.doc.events
    }

    pub fn project_name(&self) -> &str {
        &self.doc.project.name
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// One event by name, or every event when `name` is `None`.
    /// An unknown name yields an empty result.
    pub fn get_event(&self, name: Option<&str>) -> Vec<&Event> {
        match name {
            Some(n) => self.doc.events.iter().filter(|e| e.name == n).collect(),
            None => self.doc.events.iter().collect(),
        }
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.doc.events.iter().find(|e| e.name == name)
    }

    /// Replace the whole event set.
    pub fn save(&mut self, events: Vec<Event>) -> Result<()> {
        let mut candidate = self.doc.clone();
        candidate.events = events;
        self.commit(candidate, "update ledger")
    }

    /// Insert or replace one event by name.
    pub fn update_event(&mut self, event: Event) -> Result<()> {
        let mut candidate = self.doc.clone();
        let message = match candidate.events.iter_mut().find(|e| e.name == event.name) {
            Some(slot) => {
                *slot = event.clone();
                format!("update event {}", event.name)
            }
            None => {
                candidate.events.push(event.clone());
                format!("add event {}", event.name)
            }
        };
        self.commit(candidate, &message)
    }

    /// Explicitly remove an event. Returns whether it existed.
    pub fn remove_event(&mut self, name: &str) -> Result<bool> {
        let mut candidate = self.doc.clone();
        let before = candidate.events.len();
        candidate.events.retain(|e| e.name != name);
        if candidate.events.len() == before {
            return Ok(false);
        }
        self.commit(candidate, &format!("remove event {name}"))?;
        Ok(true)
    }

    pub fn set_project_name(&mut self, name: &str) -> Result<()> {
        let mut candidate = self.doc.clone();
        candidate.project.name = name.to_string();
        self.commit(candidate, &format!("set project name to {name}"))
    }

    fn commit(&mut self, candidate: LedgerDocument, message: &str) -> Result<()> {
        check_unique_events(&candidate.events)?;
        for event in &candidate.events {
            event.validate()?;
        }
        let message = format!("{message} ({})", now_rfc3339());
        self.backend.store(&candidate, &message)?;
        self.doc = candidate;
        Ok(())
    }
}

fn check_unique_events(events: &[Event]) -> Result<()> {
    let mut seen = HashSet::new();
    for e in events {
        if !seen.insert(e.name.as_str()) {
            return Err(Error::Configuration(format!("duplicate event \"{}\"", e.name)));
        }
    }
    Ok(())
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
