use async_trait::async_trait;
use olivaw_core::{Error, Event, Production, Result, Settings};
use std::path::PathBuf;

/// Record of a successful build, handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLog {
    /// Qualified production name, `event/production`.
    pub production: String,
    pub message: String,
    pub issue: Option<u64>,
}

/// Everything an adapter may read while building one production.
pub struct BuildContext<'a> {
    pub event: &'a Event,
    pub settings: &'a Settings,
    /// Scheduler queue supplied at run time, overriding every other layer.
    pub queue: Option<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(event: &'a Event, settings: &'a Settings) -> Self {
        Self {
            event,
            settings,
            queue: None,
        }
    }

    /// The event's working repository.
    pub fn repository(&self) -> Result<&'a std::path::Path> {
        self.event.repository.as_deref().ok_or_else(|| {
            Error::Configuration(format!("event \"{}\" has no repository", self.event.name))
        })
    }

    /// `<repository>/<category>` for `production`.
    pub fn category_dir(&self, production: &Production) -> Result<PathBuf> {
        Ok(self.repository()?.join(&production.category))
    }

    /// The production's run directory: its own `rundir`, else
    /// `<rundir_root>/<event>/<production>` with the root defaulting to home.
    pub fn rundir(&self, production: &Production) -> PathBuf {
        if let Some(dir) = &production.rundir {
            return dir.clone();
        }
        let root = self
            .settings
            .general
            .rundir_root
            .clone()
            .unwrap_or_else(olivaw_store::home_dir);
        root.join(&self.event.name).join(&production.name)
    }
}

/// A job-building adapter for one pipeline.
///
/// An adapter owns the production it was built for. Status changes it makes
/// (such as `stuck` on failure) are read back with [`Pipeline::into_production`].
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Lowercase pipeline identifier.
    fn name(&self) -> &'static str;

    fn production(&self) -> &Production;

    fn into_production(self: Box<Self>) -> Production;

    /// Prepare inputs in the working repository. Must be idempotent.
    async fn before_submit(&mut self, ctx: &BuildContext<'_>) -> Result<()>;

    /// Produce the submission artifacts for the scheduler.
    async fn build_dag(&mut self, ctx: &BuildContext<'_>, user: Option<&str>)
        -> Result<PipelineLog>;
}
