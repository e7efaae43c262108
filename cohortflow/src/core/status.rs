//! Stage kind enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// One task per work unit, invoking the fetch capability.
    Fetch,
    /// One task per (artifact, transform) pair.
    Transform,
    /// One task per transformed artifact, invoking the persist capability.
    Store,
}

impl StageKind {
    /// All stages in the order a pipeline runs them.
    pub const ALL: [Self; 3] = [Self::Fetch, Self::Transform, Self::Store];

    /// Returns the stage name used for scopes, events and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
