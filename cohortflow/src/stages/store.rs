use super::{Spawner, Stage, StageOptions};
use crate::capabilities::Persister;
use crate::core::{StageKind, StoredArtifact, TransformedArtifact};
use crate::errors::{CohortflowError, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Persists every transformed artifact, one task per artifact.
#[derive(Clone)]
pub struct StoreStage {
    persister: Arc<dyn Persister>,
    options: StageOptions,
}

impl StoreStage {
    /// Creates a store stage backed by `persister`.
    pub fn new(persister: Arc<dyn Persister>) -> Self {
        Self {
            persister,
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

impl std::fmt::Debug for StoreStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreStage")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for StoreStage {
    type Input = TransformedArtifact;
    type Output = StoredArtifact;

    fn kind(&self) -> StageKind {
        StageKind::Store
    }

    async fn run(&self, artifacts: Vec<TransformedArtifact>) -> Result<Vec<StoredArtifact>, CohortflowError> {
        let mut spawner = Spawner::new(StageKind::Store, &self.options);

        for artifact in artifacts {
            if !spawner.accepts() {
                break;
            }
            let persister = self.persister.clone();
            let name = format!("store:{}:{}", artifact.transform(), artifact.origin());
            spawner.spawn(name, move |ctx| async move {
                match ctx.run_until_cancelled(persister.persist(&artifact)).await {
                    Some(Ok(stored)) => Ok(stored),
                    Some(Err(source)) => Err(TaskError::Persist {
                        item: artifact.origin().reference().to_string(),
                        source,
                    }),
                    None => Err(TaskError::Cancelled),
                }
            });
        }

        let stored = spawner.finish().await?;
        info!(count = stored.len(), "Stored artifacts");
        Ok(stored)
    }
}
