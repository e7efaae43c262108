//! Error types for cohortflow.
//!
//! The taxonomy follows the lifecycle of a run:
//!
//! - capability errors ([`FetchError`], [`TransformError`], [`PersistError`])
//!   raised by the external collaborators,
//! - [`TaskError`], the error of one task in a scope, tagged with the
//!   capability and item that produced it,
//! - [`SpawnError`] and [`AggregateFailure`], raised by a scope,
//! - [`CohortflowError`], the single failure a pipeline run reports.

use crate::core::StageKind;
use crate::scope::{ScopeState, TaskState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for cohortflow operations.
#[derive(Debug, Error)]
pub enum CohortflowError {
    /// A stage's scope joined with a failure.
    #[error("{stage} stage failed: {failure}")]
    Stage {
        /// The stage that failed.
        stage: StageKind,
        /// The scope-level failure.
        #[source]
        failure: AggregateFailure,
    },

    /// A task could not be spawned.
    #[error("{0}")]
    Spawn(#[from] SpawnError),

    /// A task result was read outside its valid window.
    #[error("{0}")]
    ResultAccess(#[from] ResultAccessError),

    /// The pipeline configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl CohortflowError {
    /// Wraps a scope failure with the stage it occurred in.
    #[must_use]
    pub fn stage(stage: StageKind, failure: AggregateFailure) -> Self {
        Self::Stage { stage, failure }
    }

    /// Returns the stage that failed, if this is a stage failure.
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the task error that caused a stage failure.
    #[must_use]
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Stage { failure, .. } => Some(&failure.cause),
            _ => None,
        }
    }
}

/// The external capability a task was invoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Fetching a work unit's payload.
    Fetch,
    /// Applying a named transform.
    Transform,
    /// Persisting a transformed artifact.
    Persist,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Transform => write!(f, "transform"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// Errors raised by a fetch capability.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source does not exist.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The fetcher cannot handle this kind of reference.
    #[error("unsupported source reference: {0}")]
    Unsupported(String),

    /// The remote end answered with an error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a transform capability.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The payload cannot be handled by this transform.
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// The transform ran and failed.
    #[error("transform failed: {0}")]
    Failed(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a persist capability.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The destination refused the artifact.
    #[error("artifact rejected: {0}")]
    Rejected(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The error of a single task in a scope.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Fetching a source failed.
    #[error("fetch of '{item}' failed: {source}")]
    Fetch {
        /// The source reference.
        item: String,
        /// The capability error.
        #[source]
        source: FetchError,
    },

    /// Applying a transform failed.
    #[error("transform '{transform}' of '{item}' failed: {source}")]
    Transform {
        /// The source reference of the artifact.
        item: String,
        /// The transform identifier.
        transform: String,
        /// The capability error.
        #[source]
        source: TransformError,
    },

    /// Persisting an artifact failed.
    #[error("persist of '{item}' failed: {source}")]
    Persist {
        /// The source reference of the artifact.
        item: String,
        /// The capability error.
        #[source]
        source: PersistError,
    },

    /// The task panicked.
    #[error("task '{task}' panicked: {message}")]
    Panicked {
        /// The task name.
        task: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The scope did not drain before its deadline.
    #[error("scope did not finish within {0:?}")]
    TimedOut(Duration),

    /// The task observed cancellation and stopped early.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Returns the capability that produced this error.
    #[must_use]
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Fetch { .. } => Some(Capability::Fetch),
            Self::Transform { .. } => Some(Capability::Transform),
            Self::Persist { .. } => Some(Capability::Persist),
            Self::Panicked { .. } | Self::TimedOut(_) | Self::Cancelled => None,
        }
    }

    /// Returns the item reference the failing task was working on.
    #[must_use]
    pub fn item(&self) -> Option<&str> {
        match self {
            Self::Fetch { item, .. } | Self::Transform { item, .. } | Self::Persist { item, .. } => {
                Some(item)
            }
            Self::Panicked { .. } | Self::TimedOut(_) | Self::Cancelled => None,
        }
    }

    /// Returns true if the task stopped because it observed cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Error raised when spawning into a scope that no longer accepts tasks.
#[derive(Debug, Clone, Error)]
#[error("cannot spawn '{task}' into scope '{scope}': scope is {state}")]
pub struct SpawnError {
    /// The scope name.
    pub scope: String,
    /// The rejected task name.
    pub task: String,
    /// The scope state at the time of the call.
    pub state: ScopeState,
}

/// The failure a scope surfaces at join.
///
/// Wraps exactly one task error: the first one written to the scope's
/// failure cell. Later failures are counted in `suppressed` and dropped.
#[derive(Debug, Error)]
#[error("scope '{scope}' failed: {cause}")]
pub struct AggregateFailure {
    /// The scope name.
    pub scope: String,
    /// The first recorded task error.
    #[source]
    pub cause: TaskError,
    /// How many further failures were discarded.
    pub suppressed: usize,
}

impl AggregateFailure {
    /// Consumes the failure and returns the underlying task error.
    #[must_use]
    pub fn into_cause(self) -> TaskError {
        self.cause
    }
}

/// Error raised when a task result is read outside its valid window.
///
/// A result may only be taken after the owning scope's join returned
/// without error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultAccessError {
    /// The scope has not been joined yet.
    #[error("result of '{task}' read before scope '{scope}' was joined")]
    NotJoined {
        /// The scope name.
        scope: String,
        /// The task name.
        task: String,
    },

    /// The scope joined with a failure.
    #[error("result of '{task}' read after scope '{scope}' failed")]
    ScopeFailed {
        /// The scope name.
        scope: String,
        /// The task name.
        task: String,
    },

    /// The task never produced a value.
    #[error("task '{task}' did not complete (state: {state})")]
    NotCompleted {
        /// The task name.
        task: String,
        /// The terminal state of the task.
        state: TaskState,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The run name is empty.
    #[error("run name must not be empty")]
    EmptyRunName,

    /// A concurrency cap of zero would never run anything.
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    /// A zero deadline would fail every stage.
    #[error("stage timeout must be greater than zero")]
    ZeroTimeout,

    /// A transform identifier is not registered.
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    /// A source reference appears more than once.
    #[error("source '{0}' is listed more than once")]
    DuplicateSource(String),

    /// A transform identifier appears more than once.
    #[error("transform '{0}' is listed more than once")]
    DuplicateTransform(String),

    /// The pipeline was built without a required capability.
    #[error("no {0} capability configured")]
    MissingCapability(Capability),

    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config document is malformed.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
