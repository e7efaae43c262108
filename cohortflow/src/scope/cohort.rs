//! The scope: a cohort of tasks with shared cancellation and first-failure
//! propagation.

use super::failure::FailureCell;
use super::handle::{TaskContext, TaskHandle, TaskSlot};
use super::state::{AtomicScopeState, ScopeState, TaskState};
use crate::cancellation::CancellationToken;
use crate::errors::{AggregateFailure, SpawnError, TaskError};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, trace, warn};

/// State shared by the scope, its running tasks and its handles.
#[derive(Debug)]
pub(crate) struct ScopeShared {
    name: String,
    state: AtomicScopeState,
    joined: AtomicBool,
    token: Arc<CancellationToken>,
    failure: FailureCell,
}

impl ScopeShared {
    fn new(name: String) -> Self {
        Self {
            name,
            state: AtomicScopeState::new(ScopeState::Open),
            joined: AtomicBool::new(false),
            token: Arc::new(CancellationToken::new()),
            failure: FailureCell::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.is_set()
    }

    /// Moves `Open` to `ShuttingDown` and signals cancellation.
    fn begin_shutdown(&self, reason: &str) {
        if self.state.transition(ScopeState::Open, ScopeState::ShuttingDown) {
            debug!(scope = %self.name, reason, "Scope shutting down");
        }
        self.token.cancel(reason);
    }

    /// Writes `error` into the failure cell; the winner triggers shutdown.
    fn record_failure(&self, error: TaskError) {
        let reason = error.to_string();
        if self.failure.try_set(error) {
            warn!(scope = %self.name, error = %reason, "Task failed, cancelling siblings");
            self.begin_shutdown(&reason);
        }
    }
}

/// Configuration for a [`Scope`].
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Name used in errors and log fields.
    pub name: String,
    /// Maximum number of tasks running at once. `None` is unbounded.
    pub max_concurrency: Option<usize>,
    /// Deadline for join. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ScopeConfig {
    /// Creates an unbounded configuration without a deadline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_concurrency: None,
            timeout: None,
        }
    }

    /// Caps the number of concurrently running tasks (at least one).
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// Sets the join deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Aggregate status returned by a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSummary {
    /// The scope name.
    pub name: String,
    /// Number of tasks spawned.
    pub spawned: usize,
    /// Number of tasks that produced a value.
    pub completed: usize,
    /// Number of tasks stopped by an explicit shutdown.
    pub cancelled: usize,
    /// Wall time from creation to the end of join.
    pub elapsed: Duration,
}

/// A cohort of concurrently running tasks bound to one unit of work.
///
/// Tasks are spawned onto the tokio runtime and share one cancellation
/// token and one failure cell. The first task to fail records its error and
/// shuts the scope down: further spawns are rejected and every running task
/// is signalled to cancel. Cancellation is cooperative; a task that never
/// looks at its [`TaskContext`] runs to completion.
///
/// [`join`](Self::join) consumes the scope and waits until every task is
/// terminal. Dropping a scope without joining it cancels the token and
/// aborts whatever is still running.
///
/// ```rust,ignore
/// let mut scope = Scope::new("fetch");
/// let a = scope.spawn("a", |_ctx| async { Ok(1) })?;
/// let b = scope.spawn("b", |_ctx| async { Ok(2) })?;
/// scope.join().await?;
/// assert_eq!(a.into_output()? + b.into_output()?, 3);
/// ```
pub struct Scope<T> {
    shared: Arc<ScopeShared>,
    timeout: Option<Duration>,
    permits: Option<Arc<Semaphore>>,
    tasks: JoinSet<()>,
    task_ids: HashMap<Id, usize>,
    slots: Vec<Arc<TaskSlot<T>>>,
    created_at: Instant,
}

impl<T: Send + 'static> Scope<T> {
    /// Creates an open, unbounded scope.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(ScopeConfig::new(name))
    }

    /// Creates an open scope from a configuration.
    #[must_use]
    pub fn with_config(config: ScopeConfig) -> Self {
        Self {
            shared: Arc::new(ScopeShared::new(config.name)),
            timeout: config.timeout,
            permits: config
                .max_concurrency
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            tasks: JoinSet::new(),
            task_ids: HashMap::new(),
            slots: Vec::new(),
            created_at: Instant::now(),
        }
    }

    /// Returns the scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Returns the current scope state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.shared.state.load()
    }

    /// Returns the scope's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.shared.token
    }

    /// Returns the number of tasks spawned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing has been spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Spawns a task and returns its handle immediately.
    ///
    /// The task receives a [`TaskContext`] for cancellation checks. A task
    /// returning [`TaskError::Cancelled`] is recorded as cancelled, any
    /// other error (or a panic) fails the scope.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnError`] if the scope is shutting down or closed.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F) -> Result<TaskHandle<T>, SpawnError>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let name = name.into();
        let state = match self.state() {
            // The failure cell is written just before the state moves.
            ScopeState::Open if self.shared.has_failed() => ScopeState::ShuttingDown,
            state => state,
        };
        if !state.accepts_tasks() {
            return Err(SpawnError {
                scope: self.shared.name().to_string(),
                task: name,
                state,
            });
        }

        let index = self.slots.len();
        let slot = Arc::new(TaskSlot::new(name));
        self.slots.push(slot.clone());
        trace!(scope = %self.shared.name(), task = %slot.name(), index, "Spawning task");

        let shared = self.shared.clone();
        let permits = self.permits.clone();
        let task_slot = slot.clone();
        let abort = self.tasks.spawn(async move {
            run_task(shared, permits, task_slot, task).await;
        });
        self.task_ids.insert(abort.id(), index);

        Ok(TaskHandle::new(index, slot, self.shared.clone()))
    }

    /// Shuts the scope down: rejects further spawns and signals every
    /// running task to cancel.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown("scope shutdown requested");
    }

    /// Waits until every spawned task is terminal, then closes the scope.
    ///
    /// If a deadline is configured and passes first, a
    /// [`TaskError::TimedOut`] is recorded (unless another failure got there
    /// first) and join keeps waiting for the cancelled tasks to finish.
    ///
    /// # Errors
    ///
    /// Returns the [`AggregateFailure`] wrapping the first recorded task
    /// error.
    pub async fn join(mut self) -> Result<ScopeSummary, AggregateFailure> {
        match self.timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.drain()).await.is_err() {
                    self.shared.record_failure(TaskError::TimedOut(limit));
                    self.drain().await;
                }
            }
            None => self.drain().await,
        }
        self.close()
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_error) = joined {
                self.settle_join_error(join_error);
            }
        }
    }

    /// Settles a task whose body never recorded an outcome.
    fn settle_join_error(&self, join_error: JoinError) {
        let Some(slot) = self.task_ids.get(&join_error.id()).and_then(|&index| self.slots.get(index)) else {
            warn!(scope = %self.shared.name(), error = %join_error, "Join error for unknown task");
            return;
        };
        if slot.state().is_terminal() {
            return;
        }
        if join_error.is_panic() {
            slot.set_state(TaskState::Failed);
            self.shared.record_failure(TaskError::Panicked {
                task: slot.name().to_string(),
                message: panic_message(join_error.into_panic().as_ref()),
            });
        } else {
            warn!(scope = %self.shared.name(), task = %slot.name(), "Task aborted");
            slot.set_state(TaskState::Cancelled);
        }
    }

    fn close(&self) -> Result<ScopeSummary, AggregateFailure> {
        self.shared.state.store(ScopeState::Closed);
        self.shared.joined.store(true, Ordering::SeqCst);

        let elapsed = self.created_at.elapsed();
        let count = |wanted: TaskState| self.slots.iter().filter(|slot| slot.state() == wanted).count();

        if let Some(cause) = self.shared.failure.take() {
            let failure = AggregateFailure {
                scope: self.shared.name().to_string(),
                cause,
                suppressed: self.shared.failure.suppressed(),
            };
            debug!(
                scope = %failure.scope,
                spawned = self.slots.len(),
                suppressed = failure.suppressed,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "Scope joined with failure"
            );
            return Err(failure);
        }

        let summary = ScopeSummary {
            name: self.shared.name().to_string(),
            spawned: self.slots.len(),
            completed: count(TaskState::Completed),
            cancelled: count(TaskState::Cancelled),
            elapsed,
        };
        debug!(
            scope = %summary.name,
            spawned = summary.spawned,
            completed = summary.completed,
            cancelled = summary.cancelled,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Scope joined"
        );
        Ok(summary)
    }
}

impl<T> Drop for Scope<T> {
    fn drop(&mut self) {
        if self.shared.is_joined() {
            return;
        }
        if !self.tasks.is_empty() {
            debug!(scope = %self.shared.name(), pending = self.tasks.len(), "Scope dropped before join");
        }
        self.shared.begin_shutdown("scope dropped before join");
        self.shared.state.store(ScopeState::Closed);
        // The JoinSet aborts remaining tasks when it drops.
    }
}

impl<T> std::fmt::Debug for Scope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.shared.name())
            .field("state", &self.shared.state.load())
            .field("task_count", &self.slots.len())
            .field("failed", &self.shared.has_failed())
            .finish()
    }
}

/// Body of every spawned task: wait for a permit, run, record the outcome.
async fn run_task<T, F, Fut>(
    shared: Arc<ScopeShared>,
    permits: Option<Arc<Semaphore>>,
    slot: Arc<TaskSlot<T>>,
    task: F,
) where
    F: FnOnce(TaskContext) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let _permit = match permits {
        Some(semaphore) => {
            let acquired = tokio::select! {
                biased;
                () = shared.token.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            if acquired.is_none() {
                slot.set_state(TaskState::Cancelled);
                return;
            }
            acquired
        }
        None => None,
    };

    // Implicit check point: a task that has not started yet never will.
    if shared.token.is_cancelled() {
        slot.set_state(TaskState::Cancelled);
        return;
    }

    slot.set_state(TaskState::Running);
    let ctx = TaskContext::new(slot.name(), shared.token.clone());
    // Building the future runs inside catch_unwind too.
    let outcome = AssertUnwindSafe(async move { task(ctx).await }).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) => slot.complete(value),
        Ok(Err(TaskError::Cancelled)) => slot.set_state(TaskState::Cancelled),
        Ok(Err(error)) => {
            slot.set_state(TaskState::Failed);
            shared.record_failure(error);
        }
        Err(panic) => {
            slot.set_state(TaskState::Failed);
            shared.record_failure(TaskError::Panicked {
                task: slot.name().to_string(),
                message: panic_message(panic.as_ref()),
            });
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
