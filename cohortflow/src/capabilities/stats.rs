//! Stats sinks.

use super::StatsSink;
use tracing::info;

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatsSink;

impl StatsSink for NoOpStatsSink {
    fn report(&self, _run_name: &str, _stored_count: usize) {}
}

/// Logs every report through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStatsSink;

impl StatsSink for LoggingStatsSink {
    fn report(&self, run_name: &str, stored_count: usize) {
        info!(run_name = %run_name, stored_count, "{run_name}: stored {stored_count} artifacts");
    }
}
