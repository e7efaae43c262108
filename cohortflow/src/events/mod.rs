//! Pipeline lifecycle events.
//!
//! The orchestrator reports progress through an [`EventSink`] passed in at
//! construction. Payloads are JSON objects that always carry `run_id` and
//! `run_name`; stage events add `stage`, and completion/failure events add
//! counts or the error.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// A run was accepted and is about to fetch.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Every stage succeeded.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A stage failed; no later stage ran.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A stage is about to spawn its scope.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage joined without error.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage joined with a failure.
pub const STAGE_FAILED: &str = "stage.failed";
