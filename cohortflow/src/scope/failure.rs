//! Single-slot failure cell shared by the tasks of a scope.

use crate::errors::TaskError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Holds the first error reported by any task in a scope.
///
/// Writes are at-most-once: the first writer wins and every later error is
/// counted and dropped.
#[derive(Debug, Default)]
pub(crate) struct FailureCell {
    /// The winning error, until join moves it out.
    slot: Mutex<Option<TaskError>>,
    /// Stays true after the error is taken.
    failed: AtomicBool,
    /// Number of discarded errors.
    suppressed: AtomicUsize,
}

impl FailureCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `error` if the cell is empty.
    ///
    /// Returns true if this call won the write.
    pub(crate) fn try_set(&self, error: TaskError) -> bool {
        let mut slot = self.slot.lock();
        if self.failed.load(Ordering::SeqCst) {
            drop(slot);
            let suppressed = self.suppressed.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(error = %error, suppressed, "Discarding secondary task failure");
            return false;
        }
        *slot = Some(error);
        self.failed.store(true, Ordering::SeqCst);
        true
    }

    /// Returns true once any error has been recorded.
    pub(crate) fn is_set(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Moves the recorded error out of the cell.
    pub(crate) fn take(&self) -> Option<TaskError> {
        self.slot.lock().take()
    }

    /// Returns how many errors were discarded.
    pub(crate) fn suppressed(&self) -> usize {
        self.suppressed.load(Ordering::SeqCst)
    }
}
