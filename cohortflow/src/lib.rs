//! # Cohortflow
//!
//! Fetch, transform and store pipelines built on fail-fast task cohorts.
//!
//! A run executes three stages strictly in sequence. Each stage fans out over
//! its inputs inside a [`Scope`](scope::Scope):
//!
//! - **Fetch**: one task per source reference
//! - **Transform**: one task per (artifact, transform) pair, in one shared scope
//! - **Store**: one task per transformed artifact
//!
//! The first failing task in a scope cancels its siblings, the stage reports
//! exactly that failure, and no later stage starts. Outputs of every stage
//! keep the order of its inputs regardless of completion order.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cohortflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new()
//!     .with_run_name("images")
//!     .with_sources(["a.png", "b.png"])
//!     .with_transform("identity");
//!
//! let registry = TransformRegistry::new().with(Arc::new(IdentityTransform::new()));
//!
//! let pipeline = Pipeline::builder(config)
//!     .fetcher(Arc::new(FileFetcher::new().with_root("in")))
//!     .registry(Arc::new(registry))
//!     .persister(Arc::new(FilePersister::new("out")))
//!     .stats_sink(Arc::new(LoggingStatsSink))
//!     .build()?;
//!
//! let report = pipeline.run().await?;
//! assert_eq!(report.stored_count(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod capabilities;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod scope;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    #[cfg(feature = "http")]
    pub use crate::capabilities::HttpFetcher;
    pub use crate::capabilities::{
        FileFetcher, FilePersister, Fetcher, FnTransform, IdentityTransform, LoggingStatsSink,
        NoOpStatsSink, Persister, StatsSink, Transform, TransformRegistry,
    };
    pub use crate::core::{Artifact, StageKind, StoredArtifact, TransformedArtifact, WorkUnit};
    pub use crate::errors::{
        AggregateFailure, CohortflowError, ConfigError, FetchError, PersistError,
        ResultAccessError, SpawnError, TaskError, TransformError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat, StageTimer, StageTiming};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfig, RunId, RunReport};
    pub use crate::scope::{
        Scope, ScopeConfig, ScopeState, ScopeSummary, TaskContext, TaskHandle, TaskState,
    };
    pub use crate::stages::{FetchStage, Stage, StageOptions, StoreStage, TransformStage};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
