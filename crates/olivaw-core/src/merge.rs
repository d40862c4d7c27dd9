use std::collections::BTreeSet;

use crate::error::Result;
use crate::event::{Event, Metadata, Production};

/// Fields merged key-by-key instead of replaced wholesale.
const DEFAULT_NESTED: &[&str] = &[
    "quality",
    "quality.lower-frequency",
    "quality.upper-frequency",
    "priors",
];

/// Layered job configuration builder.
///
/// Layers are applied lowest precedence first: pipeline template, event
/// metadata, production metadata, run-time values. A higher layer replaces a
/// key outright unless the key's dotted path is registered as nested, in which
/// case both mappings merge key-by-key with the same precedence.
#[derive(Debug, Clone)]
pub struct ConfigMerger {
    nested: BTreeSet<String>,
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self {
            nested: DEFAULT_NESTED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ConfigMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra nested path such as `quality.supress`.
    pub fn with_nested(mut self, path: &str) -> Self {
        self.nested.insert(path.to_string());
        self
    }

    /// Merge the four layers of a build attempt.
    pub fn merge_for(
        &self,
        template: &Metadata,
        event: &Event,
        production: &Production,
        runtime: &Metadata,
    ) -> Metadata {
        self.merge(&[template, &event.meta, &production.meta, runtime])
    }

    /// Merge `layers`, lowest precedence first.
    pub fn merge(&self, layers: &[&Metadata]) -> Metadata {
        let mut out = Metadata::new();
        for layer in layers {
            self.merge_layer(&mut out, layer);
        }
        out
    }

    pub fn merge_layer(&self, base: &mut Metadata, overlay: &Metadata) {
        for (key, value) in overlay {
            match base.get_mut(key) {
                Some(existing) => self.merge_value(existing, value, key),
                None => {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
    }

    fn merge_value(&self, base: &mut serde_yaml::Value, overlay: &serde_yaml::Value, path: &str) {
        if self.nested.contains(path) {
            if let (serde_yaml::Value::Mapping(b), serde_yaml::Value::Mapping(o)) =
                (&mut *base, overlay)
            {
                for (k, v) in o {
                    let child = match k.as_str() {
                        Some(s) => format!("{path}.{s}"),
                        None => format!("{path}.?"),
                    };
                    match b.get_mut(k) {
                        Some(existing) => self.merge_value(existing, v, &child),
                        None => {
                            b.insert(k.clone(), v.clone());
                        }
                    }
                }
                return;
            }
        }
        *base = overlay.clone();
    }

    /// Deterministic YAML rendering of a merged document.
    pub fn render(doc: &Metadata) -> Result<String> {
        Ok(serde_yaml::to_string(doc)?)
    }
}
