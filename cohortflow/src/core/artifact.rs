//! Records flowing between pipeline stages.

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque source reference identifying one unit of input.
///
/// Usually a URL or a filesystem path. The pipeline never interprets it;
/// only fetch capabilities do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnit(String);

impl WorkUnit {
    /// Creates a work unit from a source reference.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the source reference.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.0
    }

    /// Returns the last non-empty path segment of the reference, ignoring
    /// any query string or fragment.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        let end = self.0.find(['?', '#']).unwrap_or(self.0.len());
        self.0[..end]
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty() && !segment.ends_with(':'))
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkUnit {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

impl From<String> for WorkUnit {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

/// The payload fetched for one work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The work unit this payload was fetched for.
    pub origin: WorkUnit,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
    /// When the payload was fetched.
    pub fetched_at: Timestamp,
}

impl Artifact {
    /// Creates a new artifact stamped with the current time.
    #[must_use]
    pub fn new(origin: WorkUnit, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            origin,
            payload: payload.into(),
            fetched_at: now_utc(),
        }
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Builds the output of applying `transform` to this artifact.
    ///
    /// The origin and fetch time carry over; the payload is replaced.
    #[must_use]
    pub fn transformed(&self, transform: impl Into<String>, payload: impl Into<Vec<u8>>) -> TransformedArtifact {
        TransformedArtifact {
            artifact: Self {
                origin: self.origin.clone(),
                payload: payload.into(),
                fetched_at: self.fetched_at,
            },
            transform: transform.into(),
        }
    }
}

/// An artifact plus the identifier of the transform applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedArtifact {
    /// The transformed artifact.
    pub artifact: Artifact,
    /// The transform identifier.
    pub transform: String,
}

impl TransformedArtifact {
    /// Returns the work unit the artifact came from.
    #[must_use]
    pub fn origin(&self) -> &WorkUnit {
        &self.artifact.origin
    }

    /// Returns the transformed payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.artifact.payload
    }

    /// Returns the transform identifier.
    #[must_use]
    pub fn transform(&self) -> &str {
        &self.transform
    }
}

/// Where a transformed artifact was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// The work unit the artifact came from.
    pub origin: WorkUnit,
    /// The transform that produced the stored payload.
    pub transform: String,
    /// Destination reference (a path or backend handle).
    pub location: String,
    /// Number of bytes written.
    pub size: usize,
    /// When the artifact was persisted.
    pub stored_at: Timestamp,
}

impl StoredArtifact {
    /// Records that `artifact` was persisted at `location`.
    #[must_use]
    pub fn new(artifact: &TransformedArtifact, location: impl Into<String>) -> Self {
        Self {
            origin: artifact.origin().clone(),
            transform: artifact.transform.clone(),
            location: location.into(),
            size: artifact.payload().len(),
            stored_at: now_utc(),
        }
    }
}
