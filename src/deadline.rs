//! Cooperative deadline service.
//!
//! Analytics operations receive a [`Deadline`] and are required to poll it at
//! loop granularity: per BFS frontier, per PageRank iteration, per stride of
//! an O(V) scan. There is no callback or interrupt path. Forced cancellation
//! mid-mutation would leave a store in an undefined state, so expiry is only
//! ever observed, never imposed.

use std::time::{Duration, Instant};

use crate::error::{DriverError, Result};

/// A pollable countdown constructed with a fixed budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts the countdown now.
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// The budget this deadline was constructed with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Non-blocking expiry check.
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    /// Returns a [`DriverError::Timeout`] once expired, for use with `?`
    /// inside analytics loops.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(DriverError::Timeout {
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }
}
