//! Bounded retry loop with exponential backoff and jitter
//!
//! [`retry`] and [`retry_with_budget`] run an async operation up to
//! `max_attempts` times. Between attempts they sleep for a delay that starts
//! at `initial_delay`, grows by `multiplier`, is perturbed by up to ±20% when
//! jitter is on, and never exceeds `max_delay`. The sleep is the only
//! suspension point of the loop and is raced against a
//! [`CancellationToken`].
//!
//! Errors are classified per attempt: anything on the non-retryable list
//! stops the loop at once; a non-empty retryable list turns retrying into an
//! allow-list; otherwise every error is retried.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::budget::RetryBudget;
use super::clock::{Clock, SystemClock};
use super::constants::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER,
    EXPONENTIAL_INITIAL_DELAY, EXPONENTIAL_MAX_DELAY, JITTER_RATIO, MIN_MAX_ATTEMPTS,
};
use super::error::{ConfigError, ConfigResult, RetryError, RetryResult};
use crate::utils::duration_millis;

/// Predicate over an operation error
pub type ErrorPredicate = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// Matches an operation error against a retry classification list
pub enum ErrorMatcher {
    /// Matches when the error renders to exactly this message
    Message(String),
    /// Matches when the predicate returns true (e.g. after a downcast)
    Predicate(ErrorPredicate),
}

impl ErrorMatcher {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Match any error that renders the same as `error`
    pub fn message_of(error: &impl fmt::Display) -> Self {
        Self::Message(error.to_string())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        match self {
            Self::Message(message) => error.to_string() == *message,
            Self::Predicate(predicate) => predicate(error),
        }
    }
}

impl Clone for ErrorMatcher {
    fn clone(&self) -> Self {
        match self {
            Self::Message(message) => Self::Message(message.clone()),
            Self::Predicate(predicate) => Self::Predicate(Arc::clone(predicate)),
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Predicate(_) => write!(f, "Predicate(<function>)"),
        }
    }
}

/// Retry loop configuration, passed by reference per call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// When non-empty, only matching errors are retried
    #[serde(skip)]
    pub retryable_errors: Vec<ErrorMatcher>,
    /// Matching errors are never retried; checked before `retryable_errors`
    #[serde(skip)]
    pub non_retryable_errors: Vec<ErrorMatcher>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: true,
            retryable_errors: Vec::new(),
            non_retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Fast exponential preset: 100ms first delay, capped at 10s
    pub fn exponential_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: EXPONENTIAL_INITIAL_DELAY,
            max_delay: EXPONENTIAL_MAX_DELAY,
            ..Self::default()
        }
    }

    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts < MIN_MAX_ATTEMPTS {
            return Err(ConfigError::invalid(format!(
                "max_attempts must be at least {MIN_MAX_ATTEMPTS}"
            )));
        }

        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(ConfigError::invalid(format!(
                "multiplier must be a positive finite number, got {}",
                self.multiplier
            )));
        }

        Ok(())
    }

    /// Whether an error should be retried under this configuration
    pub fn is_retryable(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        if self.non_retryable_errors.iter().any(|matcher| matcher.matches(error)) {
            return false;
        }

        if self.retryable_errors.is_empty() {
            return true;
        }

        self.retryable_errors.iter().any(|matcher| matcher.matches(error))
    }

    /// Delay before the next attempt
    ///
    /// `previous` is the delay slept before the current attempt, or `None`
    /// after the first attempt. The result is never negative and never
    /// exceeds `max_delay`.
    pub fn next_delay<J: JitterSource + ?Sized>(
        &self,
        previous: Option<Duration>,
        jitter: &J,
    ) -> Duration {
        let base = match previous {
            None => self.initial_delay.as_secs_f64(),
            Some(delay) => delay.as_secs_f64() * self.multiplier,
        };

        let mut secs = base;
        if self.jitter {
            secs += base * JITTER_RATIO * jitter.sample().clamp(-1.0, 1.0);
        }

        let max = self.max_delay.as_secs_f64();
        let secs = if secs.is_finite() { secs.clamp(0.0, max) } else { max };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    pub fn retryable_error(mut self, matcher: ErrorMatcher) -> Self {
        self.config.retryable_errors.push(matcher);
        self
    }

    pub fn non_retryable_error(mut self, matcher: ErrorMatcher) -> Self {
        self.config.non_retryable_errors.push(matcher);
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Source of jitter samples
pub trait JitterSource: Send + Sync {
    /// Uniform sample in `[-1.0, 1.0]`
    fn sample(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Reproducible jitter for tests
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        self.rng.lock().gen_range(-1.0..=1.0)
    }
}

/// Runs retry loops with a given jitter source
#[derive(Debug, Default)]
pub struct RetryExecutor<J: JitterSource = ThreadRngJitter> {
    jitter: J,
}

impl RetryExecutor<ThreadRngJitter> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<J: JitterSource> RetryExecutor<J> {
    pub fn with_jitter(jitter: J) -> Self {
        Self { jitter }
    }

    /// Retry without a budget
    pub async fn retry<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        config: &RetryConfig,
        operation: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.retry_with_budget(cancel, config, None::<&RetryBudget<SystemClock>>, operation).await
    }

    /// Retry, consuming one unit of `budget` before every attempt
    ///
    /// The first attempt is charged too, so a spent budget can reject a call
    /// before the operation ever runs.
    #[instrument(skip_all, fields(max_attempts = config.max_attempts))]
    pub async fn retry_with_budget<C, F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        config: &RetryConfig,
        budget: Option<&RetryBudget<C>>,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        C: Clock,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let max_attempts = config.max_attempts.max(MIN_MAX_ATTEMPTS);
        let mut last_error: Option<E> = None;
        let mut delay: Option<Duration> = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(budget) = budget {
                if !budget.can_retry() {
                    warn!(attempt, "Retry budget exhausted, giving up");
                    return Err(RetryError::BudgetExhausted { attempts: attempt - 1, last_error });
                }
            }

            debug!(attempt, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !config.is_retryable(&error) {
                debug!(attempt, error = %error, "Error is not retryable");
                return Err(RetryError::NonRetryable { attempts: attempt, source: error });
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "All retry attempts exhausted");
                return Err(RetryError::AttemptsExhausted { attempts: attempt, source: error });
            }

            let next = config.next_delay(delay, &self.jitter);
            delay = Some(next);
            warn!(attempt, delay = ?next, error = %error, "Operation failed, retrying");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(attempts = attempt, "Retry cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: attempt, last_error: error });
                }
                _ = tokio::time::sleep(next) => {}
            }

            last_error = Some(error);
        }
    }
}

/// Retry `operation` under `config` without a budget
pub async fn retry<F, Fut, T, E>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    RetryExecutor::new().retry(cancel, config, operation).await
}

/// Retry `operation` under `config`, charging `budget` before every attempt
pub async fn retry_with_budget<C, F, Fut, T, E>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    budget: Option<&RetryBudget<C>>,
    operation: F,
) -> RetryResult<T, E>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    RetryExecutor::new().retry_with_budget(cancel, config, budget, operation).await
}
