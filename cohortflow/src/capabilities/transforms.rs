//! Built-in transforms.

use super::Transform;
use crate::core::{Artifact, TransformedArtifact};
use crate::errors::TransformError;
use async_trait::async_trait;

/// Passes the payload through unchanged.
#[derive(Debug, Clone)]
pub struct IdentityTransform {
    name: String,
}

impl Default for IdentityTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityTransform {
    /// Creates an identity transform registered as `identity`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("identity")
    }

    /// Creates an identity transform under a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Transform for IdentityTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, artifact: &Artifact) -> Result<TransformedArtifact, TransformError> {
        Ok(artifact.transformed(&self.name, artifact.payload.clone()))
    }
}

type TransformFn = dyn Fn(&Artifact) -> Result<Vec<u8>, TransformError> + Send + Sync;

/// Adapts a synchronous closure into a [`Transform`].
///
/// The closure returns the new payload; origin and fetch time are carried
/// over from the input artifact.
pub struct FnTransform {
    name: String,
    func: Box<TransformFn>,
}

impl FnTransform {
    /// Creates a transform named `name` that runs `func` on every artifact.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Artifact) -> Result<Vec<u8>, TransformError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl std::fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Transform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, artifact: &Artifact) -> Result<TransformedArtifact, TransformError> {
        let payload = (self.func)(artifact)?;
        Ok(artifact.transformed(&self.name, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkUnit;
    use pretty_assertions::assert_eq;

    fn artifact(payload: &str) -> Artifact {
        Artifact::new(WorkUnit::new("mem://a.txt"), payload.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_identity_keeps_payload() {
        let input = artifact("hello");
        let output = IdentityTransform::new().apply(&input).await.unwrap();

        assert_eq!(output.transform(), "identity");
        assert_eq!(output.payload(), b"hello");
        assert_eq!(output.origin(), &input.origin);
        assert_eq!(output.artifact.fetched_at, input.fetched_at);
    }

    #[tokio::test]
    async fn test_fn_transform() {
        let reverse = FnTransform::new("reverse", |a: &Artifact| {
            let mut bytes = a.payload.clone();
            bytes.reverse();
            Ok(bytes)
        });

        let output = reverse.apply(&artifact("abc")).await.unwrap();
        assert_eq!(output.transform(), "reverse");
        assert_eq!(output.payload(), b"cba");
    }

    #[tokio::test]
    async fn test_fn_transform_error() {
        let utf8_only = FnTransform::new("utf8", |a: &Artifact| {
            std::str::from_utf8(&a.payload)
                .map(|s| s.as_bytes().to_vec())
                .map_err(|e| TransformError::UnsupportedPayload(e.to_string()))
        });

        let input = Artifact::new(WorkUnit::new("bin"), vec![0xff, 0xfe]);
        let err = utf8_only.apply(&input).await.unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedPayload(_)));
    }
}
