//! The three pipeline stages.
//!
//! Each stage owns one [`Scope`] per run: it spawns one task per unit of
//! work, joins the scope, and returns the outputs in input order. A failure
//! in any task cancels its siblings and surfaces as a
//! [`CohortflowError::Stage`].

mod fetch;
mod store;
mod transform;

pub use fetch::FetchStage;
pub use store::StoreStage;
pub use transform::TransformStage;

use crate::core::StageKind;
use crate::errors::{CohortflowError, SpawnError, TaskError};
use crate::scope::{Scope, ScopeConfig, TaskContext, TaskHandle};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A pipeline stage that maps an ordered batch of inputs to an ordered batch
/// of outputs.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The items the stage consumes. Each one moves into its task.
    type Input: Send + 'static;
    /// The items the stage produces.
    type Output: Send + 'static;

    /// Returns which stage this is.
    fn kind(&self) -> StageKind;

    /// Runs the stage over `inputs`, taking ownership of them.
    async fn run(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>, CohortflowError>;
}

/// Scope settings applied to every stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOptions {
    /// Maximum tasks running at once within one stage.
    pub max_concurrency: Option<usize>,
    /// Deadline for each stage's join.
    pub timeout: Option<Duration>,
}

impl StageOptions {
    /// Creates unbounded options without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps concurrency per stage.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Sets a per-stage deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn scope_config(&self, kind: StageKind) -> ScopeConfig {
        let mut config = ScopeConfig::new(kind.as_str());
        if let Some(limit) = self.max_concurrency {
            config = config.with_max_concurrency(limit);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

/// Spawns one task per item, stopping at the first rejected spawn.
pub(crate) struct Spawner<T> {
    kind: StageKind,
    scope: Scope<T>,
    handles: Vec<TaskHandle<T>>,
    rejected: Option<SpawnError>,
}

impl<T: Send + 'static> Spawner<T> {
    pub(crate) fn new(kind: StageKind, options: &StageOptions) -> Self {
        Self {
            kind,
            scope: Scope::with_config(options.scope_config(kind)),
            handles: Vec::new(),
            rejected: None,
        }
    }

    /// Returns false once the scope stopped accepting tasks.
    pub(crate) fn accepts(&self) -> bool {
        self.rejected.is_none()
    }

    pub(crate) fn spawn<F, Fut>(&mut self, name: String, task: F)
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        if self.rejected.is_some() {
            return;
        }
        match self.scope.spawn(name, task) {
            Ok(handle) => self.handles.push(handle),
            Err(e) => {
                debug!(stage = %self.kind, error = %e, "Stopped spawning");
                self.rejected = Some(e);
            }
        }
    }

    /// Joins the scope and collects outputs in spawn order.
    pub(crate) async fn finish(self) -> Result<Vec<T>, CohortflowError> {
        let kind = self.kind;
        let summary = self
            .scope
            .join()
            .await
            .map_err(|failure| CohortflowError::stage(kind, failure))?;
        if let Some(rejected) = self.rejected {
            return Err(rejected.into());
        }
        debug!(stage = %kind, completed = summary.completed, "Stage drained");

        self.handles
            .into_iter()
            .map(|handle| handle.into_output().map_err(CohortflowError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_config_from_options() {
        let config = StageOptions::new()
            .with_max_concurrency(4)
            .with_timeout(Duration::from_secs(2))
            .scope_config(StageKind::Transform);

        assert_eq!(config.name, "transform");
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_default_options_are_unbounded() {
        let config = StageOptions::default().scope_config(StageKind::Fetch);
        assert_eq!(config.max_concurrency, None);
        assert_eq!(config.timeout, None);
    }

    #[tokio::test]
    async fn test_spawner_collects_in_order() {
        let mut spawner: Spawner<usize> = Spawner::new(StageKind::Fetch, &StageOptions::new());
        for i in 0..4 {
            spawner.spawn(format!("t{i}"), move |_ctx| async move { Ok(i) });
        }
        assert!(spawner.accepts());
        assert_eq!(spawner.finish().await.unwrap(), vec![0, 1, 2, 3]);
    }
}
