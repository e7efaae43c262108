//! Task handles and the context passed to running tasks.

use super::cohort::ScopeShared;
use super::state::{AtomicTaskState, TaskState};
use crate::cancellation::CancellationToken;
use crate::errors::{ResultAccessError, TaskError};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// Per-task bookkeeping shared between the running task and its handle.
#[derive(Debug)]
pub(crate) struct TaskSlot<T> {
    name: String,
    state: AtomicTaskState,
    output: Mutex<Option<T>>,
}

impl<T> TaskSlot<T> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            state: AtomicTaskState::new(TaskState::Pending),
            output: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state);
    }

    /// Stores the value, then publishes `Completed`.
    pub(crate) fn complete(&self, value: T) {
        *self.output.lock() = Some(value);
        self.state.store(TaskState::Completed);
    }
}

/// A handle to one task spawned into a [`Scope`](super::Scope).
///
/// The handle outlives the scope. Its value can be taken with
/// [`into_output`](Self::into_output) once the scope's join has returned
/// without error.
pub struct TaskHandle<T> {
    index: usize,
    slot: Arc<TaskSlot<T>>,
    scope: Arc<ScopeShared>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(index: usize, slot: Arc<TaskSlot<T>>, scope: Arc<ScopeShared>) -> Self {
        Self { index, slot, scope }
    }

    /// Returns the spawn position of the task within its scope.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.slot.name()
    }

    /// Returns the current task state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.slot.state()
    }

    /// Returns true once the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Takes the task's value.
    ///
    /// # Errors
    ///
    /// - [`ResultAccessError::NotJoined`] if the scope has not been joined.
    /// - [`ResultAccessError::ScopeFailed`] if the join surfaced a failure.
    /// - [`ResultAccessError::NotCompleted`] if the task was cancelled.
    pub fn into_output(self) -> Result<T, ResultAccessError> {
        if !self.scope.is_joined() {
            return Err(ResultAccessError::NotJoined {
                scope: self.scope.name().to_string(),
                task: self.slot.name().to_string(),
            });
        }
        if self.scope.has_failed() {
            return Err(ResultAccessError::ScopeFailed {
                scope: self.scope.name().to_string(),
                task: self.slot.name().to_string(),
            });
        }
        self.slot
            .output
            .lock()
            .take()
            .ok_or_else(|| ResultAccessError::NotCompleted {
                task: self.slot.name().to_string(),
                state: self.slot.state(),
            })
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("scope", &self.scope.name())
            .field("index", &self.index)
            .field("name", &self.slot.name())
            .field("state", &self.state())
            .finish()
    }
}

/// What a running task can see of its scope.
#[derive(Debug, Clone)]
pub struct TaskContext {
    name: Arc<str>,
    token: Arc<CancellationToken>,
}

impl TaskContext {
    pub(crate) fn new(name: &str, token: Arc<CancellationToken>) -> Self {
        Self {
            name: Arc::from(name),
            token,
        }
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scope's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns whether the scope has signalled cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A cancellation check point.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cancelled`] if the scope is shutting down.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs `fut` until it completes or the scope is cancelled.
    ///
    /// Returns `None` if cancellation won; `fut` is dropped at its current
    /// await point.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            output = fut => Some(output),
        }
    }
}
