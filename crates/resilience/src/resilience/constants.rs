// Default values for breakers, retry configs and budgets
use std::time::Duration;

/// Circuit breaker: consecutive failures before opening
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker: half-open successes needed to close
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker: time spent open before probing
pub const DEFAULT_CIRCUIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker: probe slots while half-open
pub const DEFAULT_HALF_OPEN_REQUESTS: u32 = 3;

/// Circuit breaker: declared reset interval (not consulted by transitions)
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);

/// Retry: default attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry: first backoff delay
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Retry: backoff ceiling
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry: backoff growth factor
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry: first delay for the fast exponential preset
pub const EXPONENTIAL_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Retry: ceiling for the fast exponential preset
pub const EXPONENTIAL_MAX_DELAY: Duration = Duration::from_secs(10);

/// Jitter spread as a fraction of the computed delay (±20%)
pub const JITTER_RATIO: f64 = 0.2;

/// Minimum allowed `max_attempts`
pub const MIN_MAX_ATTEMPTS: u32 = 1;

/// Retry budget: length of one fixed accounting window
pub const BUDGET_WINDOW: Duration = Duration::from_secs(60);
