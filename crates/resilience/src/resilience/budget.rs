// Fixed-window retry budget shared by every call site of one dependency
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::constants::BUDGET_WINDOW;

/// Caps how many attempts may start against one dependency per minute
///
/// The window is fixed, not rolling: it opens at the first check after the
/// previous one expired and admits at most `max_retries_per_minute` attempts
/// until 60 seconds have passed. Every attempt consumes budget, including the
/// first attempt of a call.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct RetryBudget<C: Clock = SystemClock> {
    max_retries_per_minute: u32,
    window: Arc<Mutex<BudgetWindow>>,
    clock: Arc<C>,
}

#[derive(Debug)]
struct BudgetWindow {
    retries_this_minute: u32,
    window_start: Instant,
}

impl RetryBudget<SystemClock> {
    /// Create a budget admitting `max_retries_per_minute` attempts per window
    pub fn new(max_retries_per_minute: u32) -> Self {
        Self::with_clock(max_retries_per_minute, SystemClock)
    }
}

impl<C: Clock> RetryBudget<C> {
    /// Create a budget driven by a custom clock (for testing)
    pub fn with_clock(max_retries_per_minute: u32, clock: C) -> Self {
        let window_start = clock.now();
        Self {
            max_retries_per_minute,
            window: Arc::new(Mutex::new(BudgetWindow { retries_this_minute: 0, window_start })),
            clock: Arc::new(clock),
        }
    }

    /// Consume one attempt from the current window
    ///
    /// Returns `false` without consuming anything once the window is spent.
    pub fn can_retry(&self) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock();

        if now.saturating_duration_since(window.window_start) >= BUDGET_WINDOW {
            window.retries_this_minute = 0;
            window.window_start = now;
        }

        if window.retries_this_minute >= self.max_retries_per_minute {
            debug!(
                max_retries_per_minute = self.max_retries_per_minute,
                "Retry budget exhausted for current window"
            );
            return false;
        }

        window.retries_this_minute += 1;
        true
    }

    /// Attempts still available in the current window
    ///
    /// An expired window counts as full; nothing is mutated.
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let window = self.window.lock();

        if now.saturating_duration_since(window.window_start) >= BUDGET_WINDOW {
            self.max_retries_per_minute
        } else {
            self.max_retries_per_minute.saturating_sub(window.retries_this_minute)
        }
    }

    /// Maximum attempts per window
    pub fn capacity(&self) -> u32 {
        self.max_retries_per_minute
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for resilience::budget.
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::resilience::clock::MockClock;

    #[test]
    fn test_new_budget_is_full() {
        let budget = RetryBudget::new(10);
        assert_eq!(budget.capacity(), 10);
        assert_eq!(budget.remaining(), 10);
    }

    /// At most N checks succeed per window; refused checks consume nothing.
    #[test]
    fn test_exhaust_budget() {
        let budget = RetryBudget::new(3);

        assert!(budget.can_retry());
        assert!(budget.can_retry());
        assert!(budget.can_retry());
        assert_eq!(budget.remaining(), 0);

        assert!(!budget.can_retry());
        assert!(!budget.can_retry());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_zero_capacity_never_admits() {
        let budget = RetryBudget::new(0);
        assert!(!budget.can_retry());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_window_resets_after_sixty_seconds() {
        let clock = MockClock::new();
        let budget = RetryBudget::with_clock(2, clock.clone());

        assert!(budget.can_retry());
        assert!(budget.can_retry());
        assert!(!budget.can_retry());

        clock.advance(Duration::from_secs(59));
        assert!(!budget.can_retry());

        clock.advance(Duration::from_secs(1));
        assert_eq!(budget.remaining(), 2);
        assert!(budget.can_retry());
        assert_eq!(budget.remaining(), 1);
    }

    /// The window restarts at the check that found it expired, not on a
    /// fixed grid from construction.
    #[test]
    fn test_window_is_fixed_not_rolling() {
        let clock = MockClock::new();
        let budget = RetryBudget::with_clock(1, clock.clone());

        assert!(budget.can_retry());

        clock.advance(Duration::from_secs(90));
        assert!(budget.can_retry());

        // 30s into the window that opened at t=90s
        clock.advance(Duration::from_secs(30));
        assert!(!budget.can_retry());

        clock.advance(Duration::from_secs(30));
        assert!(budget.can_retry());
    }

    /// `remaining` reports an expired window as full without resetting it.
    #[test]
    fn test_remaining_does_not_mutate() {
        let clock = MockClock::new();
        let budget = RetryBudget::with_clock(2, clock.clone());

        assert!(budget.can_retry());
        assert!(budget.can_retry());

        clock.advance(Duration::from_secs(60));
        assert_eq!(budget.remaining(), 2);
        assert_eq!(budget.remaining(), 2);

        assert!(budget.can_retry());
        assert_eq!(budget.remaining(), 1);
    }

    #[test]
    fn test_clones_share_counter() {
        let budget = RetryBudget::new(2);
        let handle = budget.clone();

        assert!(budget.can_retry());
        assert!(handle.can_retry());
        assert!(!budget.can_retry());
        assert_eq!(handle.remaining(), 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_capacity() {
        let budget = Arc::new(RetryBudget::new(50));
        let mut handles = vec![];

        for _ in 0..8 {
            let budget = Arc::clone(&budget);
            handles.push(thread::spawn(move || (0..20).filter(|_| budget.can_retry()).count()));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(budget.remaining(), 0);
    }
}
