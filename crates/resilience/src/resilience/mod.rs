//! Resilience primitives protecting calls to downstream dependencies
//!
//! - **Circuit Breaker**: stops calling a dependency after consecutive
//!   failures and probes it again after a timeout
//! - **Retry**: bounded retry loop with exponential backoff, jitter,
//!   error classification and cooperative cancellation
//! - **Retry Budget**: fixed one-minute cap on attempts shared by every call
//!   site of one dependency
//! - **Retry Metrics**: counters collaborators record around retried calls
//!
//! Each collaborator builds one breaker and one budget per dependency at
//! startup and hands clones or `Arc`s to its tasks. Breaker and retry are
//! independent and may be nested either way:
//!
//! ```rust,no_run
//! use std::io;
//!
//! use resilience_core::{retry, CircuitBreaker, CircuitBreakerConfig, RetryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn query() -> Result<u32, io::Error> { Ok(1) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::for_agent())?;
//! let cancel = CancellationToken::new();
//!
//! let rows = retry(&cancel, &RetryConfig::exponential_backoff(3), || {
//!     let breaker = breaker.clone();
//!     async move { breaker.execute(query).await }
//! })
//! .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod circuit_breaker;
pub mod clock;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod retry;

pub use budget::RetryBudget;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerStats, CircuitState, HalfOpenAccounting,
    StateChangeCallback,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{
    ConfigError, ConfigResult, ResilienceError, ResilienceResult, RetryError, RetryResult,
};
pub use metrics::{RetryMetrics, RetryMetricsSnapshot};
pub use retry::{
    retry, retry_with_budget, ErrorMatcher, ErrorPredicate, JitterSource, RetryConfig,
    RetryConfigBuilder, RetryExecutor, SeededJitter, ThreadRngJitter,
};
