//! Core domain model types for cohortflow.
//!
//! This module contains the records that flow between stages:
//! - [`WorkUnit`]: an opaque source reference supplied by the caller
//! - [`Artifact`]: a fetched payload with its origin
//! - [`TransformedArtifact`]: an artifact plus the transform that produced it
//! - [`StoredArtifact`]: where a transformed artifact was persisted
//!
//! and the [`StageKind`] enum naming the three pipeline stages.

mod artifact;
mod status;

pub use artifact::{Artifact, StoredArtifact, TransformedArtifact, WorkUnit};
pub use status::StageKind;
