use super::{Spawner, Stage, StageOptions};
use crate::capabilities::Transform;
use crate::core::{Artifact, StageKind, TransformedArtifact};
use crate::errors::{CohortflowError, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies every configured transform to every artifact.
///
/// All `artifacts × transforms` subtasks share one scope, so a single failed
/// transform cancels the whole stage. Outputs are ordered by artifact first,
/// then by transform: `[(a1,t1), (a1,t2), (a2,t1), ...]`.
#[derive(Clone)]
pub struct TransformStage {
    transforms: Vec<Arc<dyn Transform>>,
    options: StageOptions,
}

impl TransformStage {
    /// Creates a transform stage applying `transforms` in order.
    pub fn new(transforms: Vec<Arc<dyn Transform>>) -> Self {
        Self {
            transforms,
            options: StageOptions::default(),
        }
    }

    /// Sets the scope options.
    #[must_use]
    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the transform identifiers in application order.
    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }
}

impl std::fmt::Debug for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformStage")
            .field("transforms", &self.transform_names())
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl Stage for TransformStage {
    type Input = Artifact;
    type Output = TransformedArtifact;

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn run(&self, artifacts: Vec<Artifact>) -> Result<Vec<TransformedArtifact>, CohortflowError> {
        let mut spawner = Spawner::new(StageKind::Transform, &self.options);

        let artifact_count = artifacts.len();
        'outer: for artifact in artifacts {
            let artifact = Arc::new(artifact);
            for transform in &self.transforms {
                if !spawner.accepts() {
                    break 'outer;
                }
                let transform = transform.clone();
                let artifact = artifact.clone();
                let name = format!("transform:{}:{}", transform.name(), artifact.origin);
                spawner.spawn(name, move |ctx| async move {
                    match ctx.run_until_cancelled(transform.apply(&artifact)).await {
                        Some(Ok(mut output)) => {
                            if output.transform != transform.name() {
                                warn!(
                                    expected = transform.name(),
                                    reported = %output.transform,
                                    "Transform reported a different identifier"
                                );
                                output.transform = transform.name().to_string();
                            }
                            Ok(output)
                        }
                        Some(Err(source)) => Err(TaskError::Transform {
                            item: artifact.origin.reference().to_string(),
                            transform: transform.name().to_string(),
                            source,
                        }),
                        None => Err(TaskError::Cancelled),
                    }
                });
            }
        }

        let outputs = spawner.finish().await?;
        info!(
            artifacts = artifact_count,
            transforms = self.transforms.len(),
            count = outputs.len(),
            "Transformed artifacts"
        );
        Ok(outputs)
    }
}
