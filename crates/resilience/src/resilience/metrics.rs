// Counters describing retry activity for one dependency
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Monotonic retry counters
///
/// The executor never touches these; collaborators record what they observe
/// around their own retried calls. All counters live under one lock so a
/// snapshot is always internally consistent.
#[derive(Debug, Default)]
pub struct RetryMetrics {
    counters: Mutex<RetryMetricsSnapshot>,
}

/// Point-in-time copy of [`RetryMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryMetricsSnapshot {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub budget_exhausted: u64,
}

impl RetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.counters.lock().total_attempts += 1;
    }

    pub fn record_retry(&self) {
        self.counters.lock().total_retries += 1;
    }

    pub fn record_failure(&self) {
        self.counters.lock().total_failures += 1;
    }

    pub fn record_success(&self) {
        self.counters.lock().total_successes += 1;
    }

    pub fn record_budget_exhausted(&self) {
        self.counters.lock().budget_exhausted += 1;
    }

    /// Consistent copy of every counter
    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        *self.counters.lock()
    }

    /// Alias of [`snapshot`](Self::snapshot)
    pub fn get_stats(&self) -> RetryMetricsSnapshot {
        self.snapshot()
    }
}

impl RetryMetricsSnapshot {
    /// Fraction of finished calls that succeeded, `None` before any finished
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.total_successes + self.total_failures;
        if finished == 0 {
            None
        } else {
            Some(self.total_successes as f64 / finished as f64)
        }
    }
}

impl fmt::Display for RetryMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryMetrics {{ attempts: {}, retries: {}, failures: {}, successes: {}, budget_exhausted: {} }}",
            self.total_attempts,
            self.total_retries,
            self.total_failures,
            self.total_successes,
            self.budget_exhausted
        )
    }
}
