use super::{Spawner, Stage, StageOptions};
use crate::capabilities::Fetcher;
use crate::core::{Artifact, StageKind, WorkUnit};
use crate::errors::{CohortflowError, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Fetches every source concurrently, one task per source.
#[derive(Clone)]
pub struct FetchStage {
    fetcher: Arc<dyn Fetcher>,
    options: StageOptions,
}

impl FetchStage {
    /// Creates a fetch stage backed by `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            options: StageOptions::default(),
        }
    }

    /// Sets the scope options.
    #[must_use]
    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }
}

impl std::fmt::Debug for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStage")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for FetchStage {
    type Input = WorkUnit;
    type Output = Artifact;

    fn kind(&self) -> StageKind {
        StageKind::Fetch
    }

    async fn run(&self, sources: Vec<WorkUnit>) -> Result<Vec<Artifact>, CohortflowError> {
        let mut spawner = Spawner::new(StageKind::Fetch, &self.options);

        for unit in sources {
            if !spawner.accepts() {
                break;
            }
            let fetcher = self.fetcher.clone();
            spawner.spawn(format!("fetch:{unit}"), move |ctx| async move {
                match ctx.run_until_cancelled(fetcher.fetch(&unit)).await {
                    Some(Ok(artifact)) => Ok(artifact),
                    Some(Err(source)) => Err(TaskError::Fetch {
                        item: unit.reference().to_string(),
                        source,
                    }),
                    None => Err(TaskError::Cancelled),
                }
            });
        }

        let artifacts = spawner.finish().await?;
        info!(count = artifacts.len(), "Fetched artifacts");
        Ok(artifacts)
    }
}
