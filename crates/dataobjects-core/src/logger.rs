//! Per-statement timing hook.

use std::time::Duration;

/// Receives every executed statement with its elapsed wall-clock time.
///
/// Given to a connection when it is opened. Implementations must be cheap;
/// they run on the executing thread.
pub trait QueryLogger: Send + Sync {
    fn log(&self, query: &str, elapsed: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl QueryLogger for NoopLogger {
    fn log(&self, _query: &str, _elapsed: Duration) {}
}

/// Emits `(0.000123) SELECT ...` lines through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    /// Render the log line for a statement.
    pub fn format_line(query: &str, elapsed: Duration) -> String {
        format!("({:.6}) {}", elapsed.as_secs_f64(), query)
    }
}

impl QueryLogger for TracingLogger {
    fn log(&self, query: &str, elapsed: Duration) {
        tracing::debug!(
            target: "dataobjects::query",
            elapsed_us = elapsed.as_micros() as u64,
            "{}",
            Self::format_line(query, elapsed)
        );
    }
}

impl<F> QueryLogger for F
where
    F: Fn(&str, Duration) + Send + Sync,
{
    fn log(&self, query: &str, elapsed: Duration) {
        self(query, elapsed);
    }
}
