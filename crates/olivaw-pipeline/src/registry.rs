use crate::pipeline::Pipeline;
use olivaw_core::{Error, Production, Result};
use std::collections::BTreeMap;

/// Builds an adapter that owns `production`.
pub type PipelineFactory = fn(Production) -> Result<Box<dyn Pipeline>>;

/// Lowercase pipeline identifier → adapter constructor.
pub struct Registry {
    factories: BTreeMap<String, PipelineFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(crate::rift::RIFT, crate::rift::factory);
        registry
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, factory: PipelineFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Adapter for `production.pipeline`, matched case-insensitively.
    pub fn build(&self, production: Production) -> Result<Box<dyn Pipeline>> {
        let id = production.pipeline_id();
        let factory = self.factories.get(&id).ok_or_else(|| {
            Error::Configuration(format!(
                "unknown pipeline \"{}\" for {}. Known pipelines: {}",
                production.pipeline,
                production.qualified_name(),
                self.names().join(", ")
            ))
        })?;
        factory(production)
    }
}
