use std::io;
use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Why an experiment left `Running`/`Cooloff` before completing its target.
///
/// An abort is not a failure of the harness: the experiment still finalizes
/// whatever counters exist and produces a result record carrying the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The wall-clock budget for the mutation phase was exhausted.
    Timeout,
    /// A memory-footprint sample exceeded the configured threshold.
    MemoryThreshold,
    /// A worker heartbeat stalled past the grace window.
    Deadlock {
        /// True if the stalled thread was last observed inside a store call
        /// rather than inside driver bookkeeping.
        in_store_code: bool,
    },
}

impl AbortReason {
    /// Short label used in log messages and the persisted parameter table.
    pub fn label(&self) -> &'static str {
        match self {
            AbortReason::Timeout => "timeout",
            AbortReason::MemoryThreshold => "memory_threshold",
            AbortReason::Deadlock { in_store_code: true } => "deadlock_in_store",
            AbortReason::Deadlock { in_store_code: false } => "deadlock_in_driver",
        }
    }
}

/// Error taxonomy of the harness.
///
/// `Configuration` errors are raised before any thread is spawned and never
/// leave partial state behind. `Timeout` is the cooperative deadline signal
/// raised from inside analytics calls; in mixed-workload mode it is caught by
/// the reader thread, logged and counted. `Store` failures are fatal to the
/// whole experiment: a silently retried mutation would corrupt the accounting
/// invariants.
#[derive(Debug, Error)]
pub enum DriverError {
    /// I/O failure while loading a graph or replaying a workload log.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid parameter or parameter combination, detected before start.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A cooperative deadline expired inside an analytics call.
    #[error("operation exceeded its deadline of {budget:?}")]
    Timeout {
        /// The budget the expired deadline was constructed with.
        budget: Duration,
    },
    /// A mutation or analytics call failed unexpectedly.
    #[error("store operation failed: {0}")]
    Store(String),
    /// A workload log did not parse.
    #[error("malformed workload log: {0}")]
    LogFormat(String),
    /// Writing the result record to its sink failed.
    #[error("result persistence failed: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        DriverError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for DriverError {
    fn from(err: csv::Error) -> Self {
        DriverError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_labels_are_distinct() {
        let reasons = [
            AbortReason::Timeout,
            AbortReason::MemoryThreshold,
            AbortReason::Deadlock { in_store_code: true },
            AbortReason::Deadlock { in_store_code: false },
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in reasons.iter().skip(i + 1) {
                assert_ne!(a.label(), b.label());
            }
        }
    }
}
