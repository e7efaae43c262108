//! Testing utilities for cohortflow pipelines.
//!
//! Scripted capabilities with per-reference delays, jitter and failures,
//! usable from unit tests, integration tests and benches.

mod mocks;

pub use mocks::{CollectingStatsSink, RecordingPersister, ScriptedFetcher, ScriptedTransform};
