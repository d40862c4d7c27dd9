//! Bulk application of `kind: event` / `kind: analysis` document streams.

use crate::ledger::Ledger;
use olivaw_core::{Error, Event, Production, Result};
use serde::Deserialize;
use std::path::Path;

/// One document of an apply stream.
#[derive(Debug, Clone)]
pub enum ApplyDocument {
    Event {
        event: Event,
        /// Whether the document listed its own productions.
        has_productions: bool,
    },
    Analysis {
        /// Target event named inside the document, if any.
        event: Option<String>,
        production: Production,
    },
}

/// What an apply run changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub events: Vec<String>,
    /// `event/production` names added.
    pub analyses: Vec<String>,
}

/// Read an apply source: a local path or an `http(s)://` URL.
pub fn read_source(source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        tracing::info!(url = %source, "fetching apply document");
        let mut response = ureq::get(source)
            .call()
            .map_err(|e| Error::Storage(format!("fetching {source}: {e}")))?;
        return response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::Storage(format!("reading {source}: {e}")));
    }
    let path = Path::new(source);
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Split a multi-document YAML stream into typed apply documents.
pub fn parse_documents(data: &str) -> Result<Vec<ApplyDocument>> {
    let mut docs = Vec::new();
    for (i, de) in serde_yaml::Deserializer::from_str(data).enumerate() {
        let value = serde_yaml::Value::deserialize(de)?;
        if value.is_null() {
            continue;
        }
        let serde_yaml::Value::Mapping(mut map) = value else {
            return Err(Error::Configuration(format!(
                "document {i} must be a mapping"
            )));
        };
        let kind = map
            .remove("kind")
            .and_then(|k| k.as_str().map(str::to_ascii_lowercase))
            .ok_or_else(|| Error::Configuration(format!("document {i} has no kind")))?;
        match kind.as_str() {
            "event" => {
                let has_productions = map.contains_key("productions");
                let event: Event = serde_yaml::from_value(serde_yaml::Value::Mapping(map))?;
                docs.push(ApplyDocument::Event {
                    event,
                    has_productions,
                });
            }
            "analysis" => {
                let event = match map.remove("event") {
                    Some(v) => Some(
                        v.as_str()
                            .ok_or_else(|| {
                                Error::Configuration(format!(
                                    "document {i}: event must be a string"
                                ))
                            })?
                            .to_string(),
                    ),
                    None => None,
                };
                let production = Production::from_document(serde_yaml::Value::Mapping(map))?;
                docs.push(ApplyDocument::Analysis { event, production });
            }
            other => {
                return Err(Error::Configuration(format!(
                    "document {i}: unknown kind \"{other}\". Valid kinds: event, analysis"
                )))
            }
        }
    }
    Ok(docs)
}

/// Apply documents to the ledger in order.
///
/// `default_event` targets analyses that do not name their event; when it is
/// `None` too, `prompt` is asked once and the answer reused.
pub fn apply_documents(
    ledger: &mut Ledger,
    docs: Vec<ApplyDocument>,
    default_event: Option<&str>,
    mut prompt: impl FnMut() -> Result<String>,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();
    let mut target = default_event.map(str::to_string);

    for doc in docs {
        match doc {
            ApplyDocument::Event {
                mut event,
                has_productions,
            } => {
                if !has_productions {
                    if let Some(existing) = ledger.event(&event.name) {
                        for p in existing.productions() {
                            event.add_production(p.clone())?;
                        }
                    }
                }
                tracing::info!(event = %event.name, "applying event");
                report.events.push(event.name.clone());
                ledger.update_event(event)?;
            }
            ApplyDocument::Analysis { event, production } => {
                let name = match event.or_else(|| target.clone()) {
                    Some(n) => n,
                    None => {
                        let answer = prompt()?.trim().to_string();
                        target = Some(answer.clone());
                        answer
                    }
                };
                let mut event = ledger.event(&name).cloned().ok_or_else(|| {
                    Error::Configuration(format!("event \"{name}\" not found in the ledger"))
                })?;
                tracing::info!(event = %name, production = %production.name, "applying analysis");
                report
                    .analyses
                    .push(format!("{name}/{}", production.name));
                event.add_production(production)?;
                ledger.update_event(event)?;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileBackend;
    use olivaw_core::Status;

    const STREAM: &str = r#"
kind: event
name: S000000xx
repository: /data/s000000xx
quality:
  sample-rate: 4096
---
kind: analysis
name: Prod0
pipeline: rift
approximant: IMRPhenomPv3
lmax: 2
---
kind: analysis
event: S000000xx
name: Prod1
pipeline: rift
needs: [Prod0]
"#;

    fn ledger(dir: &Path) -> Ledger {
        Ledger::open(Box::new(FileBackend::new(dir.join("ledger.yml")))).unwrap()
    }

    #[test]
    fn parse_stream() {
        let docs = parse_documents(STREAM).unwrap();
        assert_eq!(docs.len(), 3);
        assert!(matches!(&docs[0], ApplyDocument::Event { event, has_productions: false } if event.name == "S000000xx"));
        assert!(matches!(&docs[2], ApplyDocument::Analysis { event: Some(e), .. } if e == "S000000xx"));
    }

    #[test]
    fn unknown_kind_rejected() {
        let err = parse_documents("kind: pipeline\nname: x\n").unwrap_err();
        assert!(err.to_string().contains("unknown kind"));
    }

    #[test]
    fn apply_prompts_once_for_unnamed_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger(dir.path());
        let docs = parse_documents(STREAM).unwrap();
        let mut asked = 0;
        let report = apply_documents(&mut ledger, docs, None, || {
            asked += 1;
            Ok("S000000xx\n".to_string())
        })
        .unwrap();

        assert_eq!(asked, 1);
        assert_eq!(report.events, vec!["S000000xx"]);
        assert_eq!(report.analyses.len(), 2);
        let event = ledger.event("S000000xx").unwrap();
        assert_eq!(event.productions().len(), 2);
        assert_eq!(event.production("Prod1").unwrap().status, Status::Wait);
    }

    #[test]
    fn reapplying_event_keeps_productions() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger(dir.path());
        let docs = parse_documents(STREAM).unwrap();
        apply_documents(&mut ledger, docs, Some("S000000xx"), || unreachable!()).unwrap();

        let update = parse_documents("kind: event\nname: S000000xx\nwebdir: /public/S000000xx\n").unwrap();
        apply_documents(&mut ledger, update, None, || unreachable!()).unwrap();

        let event = ledger.event("S000000xx").unwrap();
        assert_eq!(event.webdir, "/public/S000000xx");
        assert_eq!(event.productions().len(), 2);
    }

    #[test]
    fn analysis_for_missing_event_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger(dir.path());
        let docs = parse_documents("kind: analysis\nname: Prod0\npipeline: rift\n").unwrap();
        let err = apply_documents(&mut ledger, docs, Some("S404"), || unreachable!()).unwrap_err();
        assert!(err.to_string().contains("S404"));
    }

    #[test]
    fn read_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apply.yaml");
        std::fs::write(&path, STREAM).unwrap();
        let data = read_source(path.to_str().unwrap()).unwrap();
        assert_eq!(parse_documents(&data).unwrap().len(), 3);
    }
}
