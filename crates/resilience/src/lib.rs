//! Resilience core shared by the data platform's downstream clients.
//!
//! Vector search, the LLM agent client, the MCP tool client and Postgres
//! access each wrap their calls in a [`CircuitBreaker`] and/or a retry loop
//! ([`retry`] / [`retry_with_budget`]) charged against a per-dependency
//! [`RetryBudget`]. State is in-process and in-memory only.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[macro_use]
pub mod utils;

pub mod resilience;

pub use resilience::{
    retry, retry_with_budget, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerStats, CircuitState, Clock, ConfigError, ConfigResult, ErrorMatcher,
    HalfOpenAccounting, JitterSource, MockClock, ResilienceError, ResilienceResult, RetryBudget,
    RetryConfig, RetryConfigBuilder, RetryError, RetryExecutor, RetryMetrics,
    RetryMetricsSnapshot, RetryResult, SeededJitter, SystemClock, ThreadRngJitter,
};
pub use utils::serde::duration_millis;
