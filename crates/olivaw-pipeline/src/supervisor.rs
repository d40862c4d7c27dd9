use crate::pipeline::{BuildContext, PipelineLog};
use crate::registry::Registry;
use olivaw_core::{get_all_latest, Actor, Error, Event, Result, Settings, Status};
use olivaw_ledger::Ledger;

/// Run-time values for a submission.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Accounting user, recorded on the production when given.
    pub user: Option<String>,
    pub queue: Option<String>,
}

/// Result of submitting one production.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `event/production`.
    pub production: String,
    pub status: Status,
    pub log: PipelineLog,
}

/// What one pass over an event achieved.
#[derive(Debug, Default)]
pub struct Advance {
    pub outcomes: Vec<Outcome>,
    /// The failure that stopped the pass, after the failed production was
    /// persisted as `stuck`.
    pub failure: Option<Error>,
}

impl Advance {
    pub fn into_result(self) -> Result<Vec<Outcome>> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.outcomes),
        }
    }
}

/// Drives productions through their adapters and records the results.
pub struct Supervisor {
    pub ledger: Ledger,
    pub settings: Settings,
    pub registry: Registry,
}

impl Supervisor {
    pub fn new(ledger: Ledger, settings: Settings) -> Self {
        Self::with_registry(ledger, settings, Registry::default())
    }

    pub fn with_registry(ledger: Ledger, settings: Settings, registry: Registry) -> Self {
        Self {
            ledger,
            settings,
            registry,
        }
    }

    fn event(&self, name: &str) -> Result<&Event> {
        self.ledger
            .event(name)
            .ok_or_else(|| Error::Configuration(format!("event \"{name}\" not found in the ledger")))
    }

    /// Names of productions in `event` ready to submit: waiting productions
    /// whose dependencies are complete, then productions an operator moved
    /// back to `ready`.
    pub fn eligible(&self, event: &str) -> Result<Vec<String>> {
        let event = self.event(event)?;
        let mut names: Vec<String> = get_all_latest(event, self.ledger.events())?
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        names.extend(
            event
                .productions()
                .iter()
                .filter(|p| p.status == Status::Ready)
                .map(|p| p.name.clone()),
        );
        Ok(names)
    }

    /// Submit every eligible production of `event`, one at a time, stopping
    /// at the first failure.
    pub async fn advance(&mut self, event: &str, opts: &BuildOptions) -> Result<Advance> {
        let names = self.eligible(event)?;
        tracing::info!(%event, eligible = names.len(), "advancing event");
        let mut advance = Advance::default();
        for name in names {
            match self.submit(event, &name, opts).await {
                Ok(outcome) => advance.outcomes.push(outcome),
                Err(e) => {
                    advance.failure = Some(e);
                    break;
                }
            }
        }
        Ok(advance)
    }

    /// Build one production and persist its new status.
    ///
    /// The production must be eligible. A build failure is persisted as
    /// `stuck` before the error is returned; when that write fails too the
    /// error is [`Error::Unrecorded`].
    pub async fn submit(
        &mut self,
        event_name: &str,
        production: &str,
        opts: &BuildOptions,
    ) -> Result<Outcome> {
        if !self.eligible(event_name)?.iter().any(|n| n == production) {
            return Err(Error::Configuration(format!(
                "{event_name}/{production} is not eligible to run"
            )));
        }
        let mut event = self.event(event_name)?.clone();
        let mut prod = event
            .production(production)
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!("production \"{production}\" not found in \"{event_name}\""))
            })?;
        if prod.status == Status::Wait {
            prod.transition(Status::Ready, Actor::Pipeline)?;
        }

        let mut adapter = self.registry.build(prod)?;
        tracing::info!(
            production = %adapter.production().qualified_name(),
            pipeline = adapter.name(),
            "submitting"
        );
        let built = {
            let mut ctx = BuildContext::new(&event, &self.settings);
            ctx.queue = opts.queue.clone();
            match adapter.before_submit(&ctx).await {
                Ok(()) => adapter.build_dag(&ctx, opts.user.as_deref()).await,
                Err(e) => Err(e),
            }
        };
        let mut prod = adapter.into_production();

        match built {
            Ok(log) => {
                prod.transition(Status::Running, Actor::Pipeline)?;
                let outcome = Outcome {
                    production: prod.qualified_name(),
                    status: prod.status,
                    log,
                };
                event.replace_production(prod)?;
                self.ledger.update_event(event)?;
                Ok(outcome)
            }
            Err(e) => {
                prod.mark_stuck();
                let qualified = prod.qualified_name();
                event.replace_production(prod)?;
                match self.ledger.update_event(event) {
                    Ok(()) => Err(e),
                    Err(persist) => {
                        tracing::warn!(production = %qualified, error = %persist, "could not record stuck production");
                        Err(Error::Unrecorded {
                            production: qualified,
                            build: Box::new(e),
                            persist: Box::new(persist),
                        })
                    }
                }
            }
        }
    }

    /// Apply a validated status change and persist it.
    pub fn set_status(
        &mut self,
        event_name: &str,
        production: &str,
        status: Status,
        actor: Actor,
    ) -> Result<()> {
        let mut event = self.event(event_name)?.clone();
        let mut prod = event
            .production(production)
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!("production \"{production}\" not found in \"{event_name}\""))
            })?;
        prod.transition(status, actor)?;
        event.replace_production(prod)?;
        self.ledger.update_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olivaw_core::settings::PipelineSettings;
    use olivaw_core::Production;
    use olivaw_ledger::{FileBackend, LedgerBackend, LedgerDocument};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// In-memory backend whose writes can be switched off.
    struct Frozen {
        doc: LedgerDocument,
        rejecting: Arc<AtomicBool>,
    }

    impl LedgerBackend for Frozen {
        fn describe(&self) -> String {
            "memory".into()
        }

        fn load(&mut self) -> Result<LedgerDocument> {
            Ok(self.doc.clone())
        }

        fn store(&mut self, doc: &LedgerDocument, _message: &str) -> Result<()> {
            if self.rejecting.load(Ordering::SeqCst) {
                return Err(Error::LedgerSync("remote has moved on".into()));
            }
            self.doc = doc.clone();
            Ok(())
        }
    }

    fn supervisor(dir: &std::path::Path) -> Supervisor {
        let ledger = Ledger::open(Box::new(FileBackend::new(dir.join("ledger.yml")))).unwrap();
        Supervisor::new(ledger, Settings::default())
    }

    #[test]
    fn eligible_includes_restarted_productions() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path());
        let mut event = Event::new("S1");
        event.add_production(Production::new("A", "rift")).unwrap();
        event
            .add_production(Production::new("B", "rift").with_needs(["A"]))
            .unwrap();
        let mut c = Production::new("C", "rift");
        c.status = Status::Ready;
        event.add_production(c).unwrap();
        sup.ledger.update_event(event).unwrap();

        assert_eq!(sup.eligible("S1").unwrap(), vec!["A", "C"]);
        assert!(sup.eligible("S9").is_err());
    }

    #[test]
    fn set_status_validates_actor() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path());
        let mut event = Event::new("S1");
        let mut a = Production::new("A", "rift");
        a.status = Status::Stuck;
        event.add_production(a).unwrap();
        sup.ledger.update_event(event).unwrap();

        let err = sup
            .set_status("S1", "A", Status::Restart, Actor::Pipeline)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        sup.set_status("S1", "A", Status::Restart, Actor::Operator)
            .unwrap();
        sup.set_status("S1", "A", Status::Ready, Actor::Operator)
            .unwrap();
        let reopened = supervisor(dir.path());
        assert_eq!(
            reopened.ledger.event("S1").unwrap().production("A").unwrap().status,
            Status::Ready
        );
    }

    #[tokio::test]
    async fn unknown_pipeline_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path());
        let mut event = Event::new("S1");
        event.add_production(Production::new("A", "lalinference")).unwrap();
        sup.ledger.update_event(event).unwrap();

        let advance = sup.advance("S1", &BuildOptions::default()).await.unwrap();
        assert!(advance.outcomes.is_empty());
        assert!(matches!(advance.failure, Some(Error::Configuration(_))));
        assert_eq!(
            sup.ledger.event("S1").unwrap().production("A").unwrap().status,
            Status::Wait
        );
    }

    #[tokio::test]
    async fn failed_stuck_write_is_reported() {
        let rejecting = Arc::new(AtomicBool::new(false));
        let backend = Frozen {
            doc: LedgerDocument::default(),
            rejecting: rejecting.clone(),
        };
        let ledger = Ledger::open(Box::new(backend)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.pipelines.insert(
            "rift".into(),
            PipelineSettings {
                environment: Some(dir.path().join("missing-env")),
                timeout_sec: 10,
                ..Default::default()
            },
        );
        let mut sup = Supervisor::new(ledger, settings);
        let mut event = Event::new("S1").with_repository(dir.path());
        event.issue = Some(5);
        event.add_production(Production::new("A", "rift")).unwrap();
        sup.ledger.update_event(event).unwrap();

        rejecting.store(true, Ordering::SeqCst);
        let err = sup
            .submit("S1", "A", &BuildOptions::default())
            .await
            .unwrap_err();
        match &err {
            Error::Unrecorded {
                production,
                build,
                persist,
            } => {
                assert_eq!(production, "S1/A");
                assert!(matches!(**build, Error::Environment { .. }));
                assert!(matches!(**persist, Error::LedgerSync(_)));
            }
            other => panic!("expected unrecorded failure, got {other}"),
        }
        assert_eq!(err.issue(), Some(5));
        assert_eq!(
            sup.ledger.event("S1").unwrap().production("A").unwrap().status,
            Status::Wait
        );
    }
}
