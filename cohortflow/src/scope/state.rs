//! Scope and task lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a scope.
///
/// `Open` → (`ShuttingDown` on first failure or explicit shutdown) →
/// `Closed` once join returns or the scope is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeState {
    /// Accepting new tasks.
    Open,
    /// Cancellation signalled; spawn is rejected.
    ShuttingDown,
    /// Joined or dropped; spawn is rejected.
    Closed,
}

impl ScopeState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::ShuttingDown => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }

    /// Returns true if the scope accepts new tasks.
    #[must_use]
    pub fn accepts_tasks(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Lifecycle of a single task.
///
/// `Pending` → `Running` → one of `Completed`, `Failed`, `Cancelled`.
/// A task cancelled before it starts goes straight from `Pending` to
/// `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawned, not yet started (possibly waiting for a concurrency permit).
    Pending,
    /// Executing.
    Running,
    /// Produced a value.
    Completed,
    /// Returned an error or panicked.
    Failed,
    /// Stopped because the scope was shut down.
    Cancelled,
}

impl TaskState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lock-free cell holding a [`ScopeState`].
#[derive(Debug)]
pub(crate) struct AtomicScopeState(AtomicU8);

impl AtomicScopeState {
    pub(crate) const fn new(state: ScopeState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn load(&self) -> ScopeState {
        ScopeState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: ScopeState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Moves from `from` to `to`; returns false if the current state differs.
    pub(crate) fn transition(&self, from: ScopeState, to: ScopeState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Lock-free cell holding a [`TaskState`].
#[derive(Debug)]
pub(crate) struct AtomicTaskState(AtomicU8);

impl AtomicTaskState {
    pub(crate) const fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: TaskState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}
