use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::status::{is_valid_transition, Actor, Status};

/// Free-form metadata: quality cuts, priors, pipeline knobs, project tags.
pub type Metadata = BTreeMap<String, serde_yaml::Value>;

/// Category used when a production does not name one.
pub const DEFAULT_CATEGORY: &str = "C01_offline";

// ── Production ──

/// One job instance attached to an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Production {
    pub name: String,
    /// Name of the owning event. Not persisted; restored when the event loads.
    pub event: String,
    pub pipeline: String,
    pub status: Status,
    pub comment: Option<String>,
    /// Dependency references, `Prod0` or `S2/Prod0`.
    pub needs: Vec<String>,
    pub rundir: Option<PathBuf>,
    pub category: String,
    pub meta: Metadata,
}

/// Persisted body of a production entry (`- Prod0: {...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProductionRecord {
    pipeline: String,
    #[serde(default = "default_status")]
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rundir: Option<PathBuf>,
    #[serde(default = "default_category", skip_serializing_if = "is_default_category")]
    category: String,
    #[serde(flatten)]
    meta: Metadata,
}

fn default_status() -> Status {
    Status::Wait
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn is_default_category(c: &String) -> bool {
    c == DEFAULT_CATEGORY
}

impl Production {
    pub fn new(name: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event: String::new(),
            pipeline: pipeline.into(),
            status: Status::Wait,
            comment: None,
            needs: Vec::new(),
            rundir: None,
            category: default_category(),
            meta: Metadata::new(),
        }
    }

    pub fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn get_meta(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.meta.get(key)
    }

    /// Metadata value rendered as a plain string (numbers and bools included).
    pub fn meta_str(&self, key: &str) -> Option<String> {
        self.meta.get(key).and_then(scalar_to_string)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<serde_yaml::Value>) {
        self.meta.insert(key.to_string(), value.into());
    }

    /// Case-insensitive pipeline identifier.
    pub fn pipeline_id(&self) -> String {
        self.pipeline.to_ascii_lowercase()
    }

    /// Parsed dependency references.
    pub fn dependency_refs(&self) -> Result<Vec<DependencyRef>> {
        self.needs.iter().map(|n| DependencyRef::parse(n)).collect()
    }

    /// Move to `to` if `actor` is allowed to make that change.
    pub fn transition(&mut self, to: Status, actor: Actor) -> Result<()> {
        if !is_valid_transition(self.status, to, actor) {
            return Err(Error::InvalidTransition {
                production: self.qualified_name(),
                from: self.status,
                to,
            });
        }
        tracing::info!(
            production = %self.qualified_name(),
            from = %self.status,
            to = %to,
            ?actor,
            "status change"
        );
        self.status = to;
        Ok(())
    }

    /// Mark the production `stuck` after a failed build step.
    pub fn mark_stuck(&mut self) {
        if self.status != Status::Stuck {
            tracing::warn!(production = %self.qualified_name(), from = %self.status, "marking stuck");
            self.status = Status::Stuck;
        }
    }

    /// `event/name`, or just `name` when detached.
    pub fn qualified_name(&self) -> String {
        if self.event.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.event, self.name)
        }
    }

    /// Build a production from a structured document.
    ///
    /// Accepts the ledger form (`{Prod0: {pipeline: ...}}`) and the flat form
    /// used by apply documents (`{name: Prod0, pipeline: ...}`).
    pub fn from_document(doc: serde_yaml::Value) -> Result<Self> {
        let serde_yaml::Value::Mapping(mut map) = doc else {
            return Err(Error::Configuration(
                "production document must be a mapping".into(),
            ));
        };
        if let Some(name) = map.remove("name") {
            let name = name
                .as_str()
                .ok_or_else(|| Error::Configuration("production name must be a string".into()))?
                .to_string();
            let record: ProductionRecord =
                serde_yaml::from_value(serde_yaml::Value::Mapping(map))?;
            return Ok(Self::from_record(name, record));
        }
        let entry: BTreeMap<String, ProductionRecord> =
            serde_yaml::from_value(serde_yaml::Value::Mapping(map))?;
        single_entry(entry)
    }

    fn from_record(name: String, record: ProductionRecord) -> Self {
        Self {
            name,
            event: String::new(),
            pipeline: record.pipeline,
            status: record.status,
            comment: record.comment,
            needs: record.needs,
            rundir: record.rundir,
            category: record.category,
            meta: record.meta,
        }
    }

    fn to_record(&self) -> ProductionRecord {
        ProductionRecord {
            pipeline: self.pipeline.clone(),
            status: self.status,
            comment: self.comment.clone(),
            needs: self.needs.clone(),
            rundir: self.rundir.clone(),
            category: self.category.clone(),
            meta: self.meta.clone(),
        }
    }
}

fn single_entry(entry: BTreeMap<String, ProductionRecord>) -> Result<Production> {
    if entry.len() != 1 {
        return Err(Error::Configuration(format!(
            "production entry must have exactly one key, got {}",
            entry.len()
        )));
    }
    let (name, record) = entry
        .into_iter()
        .next()
        .ok_or_else(|| Error::Configuration("empty production entry".into()))?;
    Ok(Production::from_record(name, record))
}

/// Render a scalar YAML value as a string.
pub fn scalar_to_string(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ── Dependency references ──

/// A dependency on another production, possibly in another event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub event: Option<String>,
    pub production: String,
}

impl DependencyRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (event, production) = match s.split_once('/') {
            Some((e, p)) => (Some(e.trim().to_string()), p.trim().to_string()),
            None => (None, s.to_string()),
        };
        if production.is_empty() || event.as_deref() == Some("") {
            return Err(Error::Configuration(format!(
                "malformed dependency reference: \"{s}\""
            )));
        }
        Ok(Self { event, production })
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            Some(e) => write!(f, "{e}/{}", self.production),
            None => f.write_str(&self.production),
        }
    }
}

// ── Event ──

/// A named analysis target owning an ordered set of productions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct Event {
    pub name: String,
    /// Working repository holding per-category job inputs.
    pub repository: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub webdir: String,
    /// Issue-tracker reference for operator visibility.
    pub issue: Option<u64>,
    productions: Vec<Production>,
    pub meta: Metadata,
}

#[derive(Serialize, Deserialize)]
struct RawEvent {
    name: String,
    #[serde(default)]
    repository: Option<PathBuf>,
    #[serde(rename = "working directory", default)]
    working_directory: Option<PathBuf>,
    #[serde(default)]
    webdir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issue: Option<u64>,
    #[serde(default)]
    productions: Vec<BTreeMap<String, ProductionRecord>>,
    #[serde(flatten)]
    meta: Metadata,
}

impl TryFrom<RawEvent> for Event {
    type Error = Error;

    fn try_from(raw: RawEvent) -> Result<Self> {
        let mut event = Event {
            name: raw.name,
            repository: raw.repository,
            working_directory: raw.working_directory,
            webdir: raw.webdir,
            issue: raw.issue,
            productions: Vec::with_capacity(raw.productions.len()),
            meta: raw.meta,
        };
        for entry in raw.productions {
            event.add_production(single_entry(entry)?)?;
        }
        Ok(event)
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        let productions = event
            .productions
            .iter()
            .map(|p| BTreeMap::from([(p.name.clone(), p.to_record())]))
            .collect();
        RawEvent {
            name: event.name,
            repository: event.repository,
            working_directory: event.working_directory,
            webdir: event.webdir,
            issue: event.issue,
            productions,
            meta: event.meta,
        }
    }
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
            working_directory: None,
            webdir: String::new(),
            issue: None,
            productions: Vec::new(),
            meta: Metadata::new(),
        }
    }

    pub fn with_repository(mut self, repo: impl Into<PathBuf>) -> Self {
        self.repository = Some(repo.into());
        self
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, name: &str) -> Option<&Production> {
        self.productions.iter().find(|p| p.name == name)
    }

    /// Append a production. Names are unique within an event.
    pub fn add_production(&mut self, mut production: Production) -> Result<()> {
        if self.production(&production.name).is_some() {
            return Err(Error::Configuration(format!(
                "duplicate production \"{}\" in event \"{}\"",
                production.name, self.name
            )));
        }
        production.event = self.name.clone();
        self.productions.push(production);
        Ok(())
    }

    /// Replace an existing production by name, keeping its position.
    pub fn replace_production(&mut self, mut production: Production) -> Result<()> {
        let slot = self
            .productions
            .iter_mut()
            .find(|p| p.name == production.name)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "production \"{}\" not found in event \"{}\"",
                    production.name, self.name
                ))
            })?;
        production.event = self.name.clone();
        *slot = production;
        Ok(())
    }

    pub fn remove_production(&mut self, name: &str) -> Option<Production> {
        let idx = self.productions.iter().position(|p| p.name == name)?;
        Some(self.productions.remove(idx))
    }

    pub fn get_meta(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.meta.get(key)
    }

    /// Check internal invariants that a hand-built event could violate.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.productions {
            if !seen.insert(p.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate production \"{}\" in event \"{}\"",
                    p.name, self.name
                )));
            }
            p.dependency_refs()?;
        }
        Ok(())
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
