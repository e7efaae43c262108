//! Structured task cohorts.
//!
//! This module provides:
//! - [`Scope`]: spawn, join, shutdown with fail-fast cancellation
//! - [`TaskHandle`]: per-task state plus a post-join result accessor
//! - [`TaskContext`]: cancellation check points for running tasks
//! - [`ScopeState`] / [`TaskState`]: the lifecycle state machines

mod cohort;
mod failure;
mod handle;
#[cfg(test)]
mod scope_tests;
mod state;

pub use cohort::{Scope, ScopeConfig, ScopeSummary};
pub use handle::{TaskContext, TaskHandle};
pub use state::{ScopeState, TaskState};
