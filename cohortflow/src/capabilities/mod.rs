//! Capabilities injected into the pipeline stages.
//!
//! The stages never touch the network or the filesystem themselves. They call
//! into these traits, which are supplied by the caller when the pipeline is
//! built:
//!
//! - [`Fetcher`]: resolves a source reference into an [`Artifact`]
//! - [`Transform`]: one named transform, dispatched by [`TransformRegistry`]
//! - [`Persister`]: writes a [`TransformedArtifact`] somewhere durable
//! - [`StatsSink`]: receives the stored-artifact count of a successful run

mod fs;
#[cfg(feature = "http")]
mod http;
mod registry;
mod stats;
mod transforms;

pub use fs::{FileFetcher, FilePersister};
#[cfg(feature = "http")]
pub use http::HttpFetcher;
pub use registry::TransformRegistry;
pub use stats::{LoggingStatsSink, NoOpStatsSink};
pub use transforms::{FnTransform, IdentityTransform};

use crate::core::{Artifact, StoredArtifact, TransformedArtifact, WorkUnit};
use crate::errors::{FetchError, PersistError, TransformError};
use async_trait::async_trait;

/// Resolves source references into artifacts.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the payload behind `unit`.
    async fn fetch(&self, unit: &WorkUnit) -> Result<Artifact, FetchError>;
}

/// A named transform applied to every fetched artifact.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Returns the identifier the transform is registered under.
    fn name(&self) -> &str;

    /// Applies the transform to `artifact`.
    async fn apply(&self, artifact: &Artifact) -> Result<TransformedArtifact, TransformError>;
}

/// Persists transformed artifacts.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Writes `artifact` and returns where it went.
    async fn persist(&self, artifact: &TransformedArtifact) -> Result<StoredArtifact, PersistError>;
}

/// Receives the outcome of a successful run.
///
/// Reporting is best-effort: implementations swallow their own errors.
#[cfg_attr(test, mockall::automock)]
pub trait StatsSink: Send + Sync {
    /// Reports how many artifacts a run stored.
    fn report(&self, run_name: &str, stored_count: usize);
}
