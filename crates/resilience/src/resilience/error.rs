//! Error types for the circuit breaker and the retry executor
//!
//! Both enums are generic over the protected operation's own error `E` and
//! keep it intact, so callers can tell a rejected call apart from a genuine
//! downstream failure and still inspect the failure itself.

use thiserror::Error;

/// Invalid breaker or retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Outcome of a call guarded by a [`CircuitBreaker`](super::CircuitBreaker)
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call; the operation never ran
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The operation ran and failed
    #[error("operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the breaker rejected the call without running it
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// The operation's own error, if it ran
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen => None,
            Self::OperationFailed { source } => Some(source),
        }
    }

    /// Consume the error and return the operation's own error, if it ran
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::CircuitOpen => None,
            Self::OperationFailed { source } => Some(source),
        }
    }
}

/// Result type for breaker-guarded calls
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Terminal outcome of a retry loop that did not succeed
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The shared budget refused an attempt
    ///
    /// `last_error` is `None` when the very first attempt was refused.
    #[error("retry budget exhausted after {attempts} attempts")]
    BudgetExhausted {
        attempts: u32,
        #[source]
        last_error: Option<E>,
    },

    /// The error was classified as not worth retrying
    #[error("non-retryable error: {source}")]
    NonRetryable {
        attempts: u32,
        #[source]
        source: E,
    },

    /// Every allowed attempt failed
    #[error("retry failed after {attempts} attempts: {source}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The cancellation token fired during a backoff sleep
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled {
        attempts: u32,
        #[source]
        last_error: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::BudgetExhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::AttemptsExhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation, if it ran at all
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::BudgetExhausted { last_error, .. } => last_error.as_ref(),
            Self::NonRetryable { source, .. } | Self::AttemptsExhausted { source, .. } => Some(source),
            Self::Cancelled { last_error, .. } => Some(last_error),
        }
    }

    /// Consume the error and return the operation's last error, if any
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::BudgetExhausted { last_error, .. } => last_error,
            Self::NonRetryable { source, .. } | Self::AttemptsExhausted { source, .. } => Some(source),
            Self::Cancelled { last_error, .. } => Some(last_error),
        }
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for retried calls
pub type RetryResult<T, E> = Result<T, RetryError<E>>;
