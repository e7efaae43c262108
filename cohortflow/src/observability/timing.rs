//! Stage timing.

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How long one stage of a run took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// The stage.
    pub stage: StageKind,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
    /// Whether the stage succeeded.
    pub succeeded: bool,
}

/// Measures the wall time of one stage.
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    stage: StageKind,
}

impl StageTimer {
    /// Starts timing `stage`.
    #[must_use]
    pub fn start(stage: StageKind) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Returns the stage being timed.
    #[must_use]
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer.
    #[must_use]
    pub fn finish(self, succeeded: bool) -> StageTiming {
        StageTiming {
            stage: self.stage,
            duration_ms: self.elapsed_ms(),
            succeeded,
        }
    }
}
