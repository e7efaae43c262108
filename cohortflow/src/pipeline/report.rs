//! Run identity and the report of a successful run.

use crate::core::{StageKind, StoredArtifact};
use crate::observability::StageTiming;
use crate::utils::{generate_uuid, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self(generate_uuid())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The run id.
    pub run_id: RunId,
    /// The configured run name.
    pub run_name: String,
    /// Number of artifacts fetched.
    pub fetched: usize,
    /// Number of transformed artifacts.
    pub transformed: usize,
    /// Stored artifacts, in (source, transform) order.
    pub stored: Vec<StoredArtifact>,
    /// Wall time of each stage, in execution order.
    pub stage_timings: Vec<StageTiming>,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
}

impl RunReport {
    /// Returns the number of stored artifacts, the value sent to the stats
    /// sink.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }

    /// Returns the timing of `stage`.
    #[must_use]
    pub fn timing(&self, stage: StageKind) -> Option<&StageTiming> {
        self.stage_timings.iter().find(|t| t.stage == stage)
    }

    /// Returns the run's wall time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_run_id_serializes_as_string() {
        let id = RunId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
