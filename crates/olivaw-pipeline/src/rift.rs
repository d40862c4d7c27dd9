//! The RIFT adapter: PSD conversion and `util_RIFT_pseudo_pipe.py` DAG builds.

use crate::environment::RuntimeEnvironment;
use crate::pipeline::{BuildContext, Pipeline, PipelineLog};
use crate::process::{self, CommandSpec, ProcessOutput, SuccessRule};
use crate::repo::WorkingRepository;
use async_trait::async_trait;
use olivaw_core::event::scalar_to_string;
use olivaw_core::settings::PipelineSettings;
use olivaw_core::{ConfigMerger, Error, Metadata, Production, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

pub const RIFT: &str = "rift";

const PSEUDO_PIPE: &str = "util_RIFT_pseudo_pipe.py";
const PSD_CONVERTER: &str = "convert_psd_ascii2xml";
const DAG_MARKER: &str = "Successfully created DAG file.";
const DEFAULT_CALIBRATION: &str = "C01";
const DEFAULT_CIP_JOBS: u64 = 3;

pub(crate) fn factory(production: Production) -> Result<Box<dyn Pipeline>> {
    Ok(Box::new(Rift::new(production)?))
}

pub struct Rift {
    production: Production,
}

impl Rift {
    pub fn new(production: Production) -> Result<Self> {
        if production.pipeline_id() != RIFT {
            return Err(Error::Configuration(format!(
                "{} uses pipeline \"{}\", not {RIFT}",
                production.qualified_name(),
                production.pipeline
            )));
        }
        Ok(Self { production })
    }

    /// Defaults every RIFT job starts from.
    pub fn template() -> Metadata {
        let mut t = Metadata::new();
        t.insert("pipeline".into(), Value::from(RIFT));
        t.insert("queue".into(), Value::from("Priority_PE"));
        t.insert("calibration".into(), Value::from(DEFAULT_CALIBRATION));
        t.insert("cip jobs".into(), Value::from(DEFAULT_CIP_JOBS));
        t
    }

    fn settings(ctx: &BuildContext<'_>) -> PipelineSettings {
        ctx.settings.pipeline(RIFT)
    }

    fn failure(&self, ctx: &BuildContext<'_>, out: ProcessOutput) -> Error {
        Error::BuildFailure {
            production: self.production.qualified_name(),
            command: out.command,
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            issue: ctx.event.issue,
        }
    }

    /// Interferometers from production metadata, else event metadata.
    fn interferometers(&self, ctx: &BuildContext<'_>) -> Vec<String> {
        let value = self
            .production
            .get_meta("interferometers")
            .or_else(|| ctx.event.get_meta("interferometers"));
        match value {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(v) => scalar_to_string(v).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// ASCII PSD for `ifo` from `psds.<ifo>`, production first.
    fn ascii_psd(&self, ctx: &BuildContext<'_>, ifo: &str) -> Result<PathBuf> {
        let lookup = |psds: Option<&Value>| {
            psds.and_then(|p| p.get(ifo))
                .and_then(scalar_to_string)
                .map(PathBuf::from)
        };
        let path = lookup(self.production.get_meta("psds"))
            .or_else(|| lookup(ctx.event.get_meta("psds")))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "{}: no ascii psd for {ifo} (psds.{ifo})",
                    self.production.qualified_name()
                ))
            })?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(ctx.category_dir(&self.production)?.join(path))
        }
    }

    fn psd_dir(&self, ctx: &BuildContext<'_>) -> Result<PathBuf> {
        Ok(ctx
            .category_dir(&self.production)?
            .join(&self.production.name)
            .join("psds"))
    }

    /// Convert the ASCII PSDs into `<IFO>-psd.xml` and commit them.
    ///
    /// An artifact counts as done once it is tracked in the working
    /// repository. Untracked leftovers from an interrupted run are converted
    /// again, and every expected artifact goes into the commit.
    async fn convert_psds(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let ifos = self.interferometers(ctx);
        if ifos.is_empty() {
            return Ok(());
        }
        let settings = Self::settings(ctx);
        let psd_dir = self.psd_dir(ctx)?;
        let repo = WorkingRepository::new(ctx.repository()?, settings.timeout_sec);

        let mut artifacts = Vec::new();
        let mut pending = Vec::new();
        for ifo in ifos {
            let artifact = psd_dir.join(format!("{ifo}-psd.xml"));
            let tracked = repo
                .is_tracked(&artifact)
                .await
                .map_err(|out| self.failure(ctx, out))?;
            if !tracked || !artifact.exists() {
                pending.push((ifo, artifact.clone()));
            }
            artifacts.push(artifact);
        }

        if pending.is_empty() {
            tracing::debug!(production = %self.production.qualified_name(), "xml psds committed");
        } else {
            let env = RuntimeEnvironment::activate(
                settings.environment.as_deref(),
                &self.production,
                ctx.event.issue,
                settings.timeout_sec,
            )
            .await?;
            std::fs::create_dir_all(&psd_dir).map_err(|e| Error::io(&psd_dir, e))?;

            for (ifo, artifact) in &pending {
                let ascii = self.ascii_psd(ctx, ifo)?;
                let spec = CommandSpec::new(settings.executable(PSD_CONVERTER))
                    .args(["--fname-psd-ascii"])
                    .arg(ascii.display().to_string())
                    .args(["--conventional-postfix", "--ifo", ifo.as_str()])
                    .current_dir(&psd_dir)
                    .envs(&env.vars)
                    .timeout_sec(settings.timeout_sec);
                tracing::info!(production = %self.production.qualified_name(), %ifo, "converting psd");
                let out = process::run(&spec).await;
                if !out.satisfies(&[SuccessRule::ExitZero]) || !artifact.exists() {
                    return Err(self.failure(ctx, out));
                }
            }
        }

        let message = format!("Added converted xml psds for {}", self.production.qualified_name());
        repo.commit_paths(&artifacts, &message)
            .await
            .map_err(|out| self.failure(ctx, out))?;
        repo.push_if_ahead()
            .await
            .map_err(|out| self.failure(ctx, out))?;
        Ok(())
    }

    async fn try_build_dag(
        &mut self,
        ctx: &BuildContext<'_>,
        user: Option<&str>,
    ) -> Result<PipelineLog> {
        let settings = Self::settings(ctx);
        let env = RuntimeEnvironment::activate(
            settings.environment.as_deref(),
            &self.production,
            ctx.event.issue,
            settings.timeout_sec,
        )
        .await?;

        if let Some(u) = user {
            self.production.set_meta("user", u);
        }
        let user = user
            .map(str::to_string)
            .or_else(|| self.production.meta_str("user"))
            .or_else(|| ctx.settings.condor.user.clone());

        let rundir = ctx.rundir(&self.production);
        self.production.rundir = Some(rundir.clone());

        let mut runtime = Metadata::new();
        if let Some(u) = &user {
            runtime.insert("user".into(), Value::from(u.as_str()));
        }
        if let Some(q) = &ctx.queue {
            runtime.insert("queue".into(), Value::from(q.as_str()));
        }
        let config = ConfigMerger::new().merge_for(&Self::template(), ctx.event, &self.production, &runtime);

        let approximant = self.required(&config, "approximant")?;
        let lmax = self.required(&config, "lmax")?;
        let calibration = config
            .get("calibration")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| DEFAULT_CALIBRATION.to_string());
        let cip_jobs = config
            .get("cip jobs")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| DEFAULT_CIP_JOBS.to_string());

        let config_path = rundir.join(format!("{}.yaml", self.production.name));
        write_config(&config_path, &config)?;

        let category_dir = ctx.category_dir(&self.production)?;
        let coinc = self
            .production
            .meta_str("coinc file")
            .map(PathBuf::from)
            .unwrap_or_else(|| category_dir.join("coinc.xml"));
        if !category_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "{}: category directory {} does not exist",
                self.production.qualified_name(),
                category_dir.display()
            )));
        }

        let label = format!("{calibration}:{approximant}");
        let spec = CommandSpec::new(settings.executable(PSEUDO_PIPE))
            .arg("--use-coinc")
            .arg(coinc.display().to_string())
            .args(["--l-max", lmax.as_str()])
            .args(["--calibration", calibration.as_str()])
            .arg("--add-extrinsic")
            .args(["--archive-pesummary-label", label.as_str()])
            .args(["--archive-pesummary-event-label", label.as_str()])
            .args(["--cip-explode-jobs", cip_jobs.as_str()])
            .arg("--use-rundir")
            .arg(rundir.display().to_string())
            .arg("--use-ini")
            .arg(config_path.display().to_string())
            .current_dir(&category_dir)
            .envs(&env.vars)
            .timeout_sec(settings.timeout_sec);

        tracing::info!(
            production = %self.production.qualified_name(),
            rundir = %rundir.display(),
            "building dag"
        );
        let out = process::run(&spec).await;
        let rules = [
            SuccessRule::ExitZero,
            SuccessRule::EmptyStderr,
            SuccessRule::StdoutContains(DAG_MARKER),
        ];
        let violations = out.violations(&rules);
        if !violations.is_empty() {
            tracing::warn!(
                production = %self.production.qualified_name(),
                reasons = %violations.join(", "),
                "dag build failed"
            );
            return Err(self.failure(ctx, out));
        }

        Ok(PipelineLog {
            production: self.production.qualified_name(),
            message: out.stdout,
            issue: ctx.event.issue,
        })
    }

    fn required(&self, config: &Metadata, key: &str) -> Result<String> {
        config.get(key).and_then(scalar_to_string).ok_or_else(|| {
            Error::Configuration(format!(
                "{} is missing required metadata \"{key}\"",
                self.production.qualified_name()
            ))
        })
    }
}

fn write_config(path: &Path, config: &Metadata) -> Result<()> {
    let yaml = ConfigMerger::render(config)?;
    olivaw_store::write_atomic(path, yaml.as_bytes())
        .map_err(|e| Error::Storage(format!("writing {}: {e}", path.display())))
}

#[async_trait]
impl Pipeline for Rift {
    fn name(&self) -> &'static str {
        RIFT
    }

    fn production(&self) -> &Production {
        &self.production
    }

    fn into_production(self: Box<Self>) -> Production {
        self.production
    }

    async fn before_submit(&mut self, ctx: &BuildContext<'_>) -> Result<()> {
        let result = self.convert_psds(ctx).await;
        if result.is_err() {
            self.production.mark_stuck();
        }
        result
    }

    async fn build_dag(
        &mut self,
        ctx: &BuildContext<'_>,
        user: Option<&str>,
    ) -> Result<PipelineLog> {
        let result = self.try_build_dag(ctx, user).await;
        if result.is_err() {
            self.production.mark_stuck();
        }
        result
    }
}
