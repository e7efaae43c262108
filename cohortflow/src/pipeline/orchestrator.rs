//! Sequential fetch → transform → store orchestration.

use super::config::PipelineConfig;
use super::report::{RunId, RunReport};
use crate::capabilities::{Fetcher, NoOpStatsSink, Persister, StatsSink, TransformRegistry};
use crate::core::StoredArtifact;
use crate::errors::{Capability, CohortflowError, ConfigError};
use crate::events::{
    EventSink, NoOpEventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED,
    STAGE_COMPLETED, STAGE_FAILED, STAGE_STARTED,
};
use crate::observability::{StageTimer, StageTiming};
use crate::stages::{FetchStage, Stage, StoreStage, TransformStage};
use crate::utils::{iso_timestamp, now_utc};
use serde_json::json;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    registry: Option<Arc<TransformRegistry>>,
    persister: Option<Arc<dyn Persister>>,
    stats: Option<Arc<dyn StatsSink>>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Starts a builder for `config`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the fetch capability.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the registry transform identifiers are resolved against.
    #[must_use]
    pub fn registry(mut self, registry: Arc<TransformRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the persist capability.
    #[must_use]
    pub fn persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Sets the stats sink. Defaults to [`NoOpStatsSink`].
    #[must_use]
    pub fn stats_sink(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Sets the event sink. Defaults to [`NoOpEventSink`].
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the configuration and resolves the transforms.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid, a capability
    /// is missing, or a transform identifier is not registered.
    pub fn build(self) -> Result<Pipeline, CohortflowError> {
        self.config.validate()?;

        let fetcher = self
            .fetcher
            .ok_or(ConfigError::MissingCapability(Capability::Fetch))?;
        let persister = self
            .persister
            .ok_or(ConfigError::MissingCapability(Capability::Persist))?;
        let registry = self.registry.unwrap_or_default();
        let transforms = registry.resolve(self.config.transforms.as_slice())?;

        let options = self.config.stage_options();
        Ok(Pipeline {
            fetch: FetchStage::new(fetcher).with_options(options),
            transform: TransformStage::new(transforms).with_options(options),
            store: StoreStage::new(persister).with_options(options),
            stats: self.stats.unwrap_or_else(|| Arc::new(NoOpStatsSink)),
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            config: self.config,
        })
    }
}

/// A configured fetch → transform → store pipeline.
///
/// Stages run strictly one after another; each stage fans out over its
/// inputs in its own scope. The first failure in any stage aborts the run
/// before the next stage starts, and the stats sink is only called when all
/// three stages succeed.
pub struct Pipeline {
    config: PipelineConfig,
    fetch: FetchStage,
    transform: TransformStage,
    store: StoreStage,
    stats: Arc<dyn StatsSink>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

/// Per-run values threaded through the stages.
struct RunContext {
    run_id: RunId,
    timings: Vec<StageTiming>,
}

impl Pipeline {
    /// Starts a builder for `config`.
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Returns the configuration the pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline once over the configured sources.
    ///
    /// # Errors
    ///
    /// Returns [`CohortflowError::Stage`] naming the first stage that failed
    /// and the task error that caused it.
    pub async fn run(&self) -> Result<RunReport, CohortflowError> {
        let run_id = RunId::new();
        let span = info_span!("pipeline_run", run_id = %run_id, run_name = %self.config.run_name);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: RunId) -> Result<RunReport, CohortflowError> {
        let started_at = now_utc();
        let mut ctx = RunContext {
            run_id,
            timings: Vec::with_capacity(3),
        };

        info!(
            sources = self.config.sources.len(),
            transforms = self.config.transforms.len(),
            "Pipeline started"
        );
        self.emit(
            &ctx,
            PIPELINE_STARTED,
            json!({
                "sources": self.config.sources.len(),
                "transforms": self.config.transforms,
            }),
        )
        .await;

        let outputs = match self.run_stages(&mut ctx).await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!(error = %e, "Pipeline failed");
                self.emit(
                    &ctx,
                    PIPELINE_FAILED,
                    json!({
                        "stage": e.failed_stage(),
                        "error": e.to_string(),
                    }),
                )
                .await;
                return Err(e);
            }
        };

        let report = RunReport {
            run_id,
            run_name: self.config.run_name.clone(),
            fetched: outputs.fetched,
            transformed: outputs.transformed,
            stored: outputs.stored,
            stage_timings: ctx.timings.clone(),
            started_at,
            finished_at: now_utc(),
        };

        self.report_stats(report.stored_count());
        info!(stored = report.stored_count(), duration_ms = report.duration_ms(), "Pipeline completed");
        self.emit(
            &ctx,
            PIPELINE_COMPLETED,
            json!({
                "fetched": report.fetched,
                "transformed": report.transformed,
                "stored": report.stored_count(),
            }),
        )
        .await;
        Ok(report)
    }

    async fn run_stages(&self, ctx: &mut RunContext) -> Result<StageOutputs, CohortflowError> {
        // Each batch moves into the next stage; nothing is kept behind.
        let artifacts = self.run_stage(&self.fetch, self.config.sources.clone(), ctx).await?;
        let fetched = artifacts.len();
        let transformed = self.run_stage(&self.transform, artifacts, ctx).await?;
        let transformed_count = transformed.len();
        let stored = self.run_stage(&self.store, transformed, ctx).await?;
        Ok(StageOutputs {
            fetched,
            transformed: transformed_count,
            stored,
        })
    }

    async fn run_stage<S: Stage>(
        &self,
        stage: &S,
        inputs: Vec<S::Input>,
        ctx: &mut RunContext,
    ) -> Result<Vec<S::Output>, CohortflowError> {
        let kind = stage.kind();
        self.emit(ctx, STAGE_STARTED, json!({ "stage": kind, "inputs": inputs.len() }))
            .await;

        let timer = StageTimer::start(kind);
        let result = stage
            .run(inputs)
            .instrument(info_span!("stage", stage = %kind))
            .await;
        let timing = timer.finish(result.is_ok());
        ctx.timings.push(timing);

        match &result {
            Ok(outputs) => {
                self.emit(
                    ctx,
                    STAGE_COMPLETED,
                    json!({
                        "stage": kind,
                        "outputs": outputs.len(),
                        "duration_ms": timing.duration_ms,
                    }),
                )
                .await;
            }
            Err(e) => {
                self.emit(
                    ctx,
                    STAGE_FAILED,
                    json!({
                        "stage": kind,
                        "error": e.to_string(),
                        "duration_ms": timing.duration_ms,
                    }),
                )
                .await;
            }
        }
        result
    }

    /// Calls the stats sink, containing any panic it raises.
    fn report_stats(&self, stored_count: usize) {
        let run_name = self.config.run_name.as_str();
        let reported = catch_unwind(AssertUnwindSafe(|| self.stats.report(run_name, stored_count)));
        if reported.is_err() {
            warn!(run_name, stored_count, "Stats sink panicked; ignoring");
        }
    }

    async fn emit(&self, ctx: &RunContext, event_type: &str, mut data: serde_json::Value) {
        if let Some(fields) = data.as_object_mut() {
            fields.insert("run_id".to_string(), json!(ctx.run_id));
            fields.insert("run_name".to_string(), json!(self.config.run_name));
            fields.insert("timestamp".to_string(), json!(iso_timestamp()));
        }
        self.events.emit(event_type, Some(data)).await;
    }
}

struct StageOutputs {
    fetched: usize,
    transformed: usize,
    stored: Vec<StoredArtifact>,
}
