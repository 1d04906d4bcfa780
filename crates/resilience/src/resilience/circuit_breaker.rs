//! Circuit breaker guarding one downstream dependency
//!
//! A breaker counts consecutive failures while [`CircuitState::Closed`],
//! rejects every call while [`CircuitState::Open`], and after `timeout` lets
//! a bounded number of probe calls through in [`CircuitState::HalfOpen`] to
//! decide whether the dependency recovered.
//!
//! The Open → HalfOpen transition is lazy: nothing runs in the background, the
//! next admission check after the timeout performs it. All state lives under
//! one `RwLock`; admission checks take the shared lock and upgrade to the
//! exclusive lock only to transition, re-validating after the upgrade so a
//! single racing caller wins.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::constants::{
    DEFAULT_CIRCUIT_TIMEOUT, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_REQUESTS,
    DEFAULT_RESET_INTERVAL, DEFAULT_SUCCESS_THRESHOLD,
};
use super::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
use crate::utils::duration_millis;

const DEFAULT_BREAKER_NAME: &str = "default";

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation, every call is allowed
    Closed,
    /// Rejecting every call until the timeout elapses
    Open,
    /// Admitting a bounded number of probe calls
    HalfOpen,
}

impl_state_names!(CircuitState {
    Closed => "closed",
    Open => "open",
    HalfOpen => "half-open",
});

/// When a half-open probe slot is consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfOpenAccounting {
    /// A slot is taken when the call is admitted, so `max_requests` bounds
    /// how many probes are in flight
    #[default]
    OnAdmission,
    /// A slot is taken when a probe succeeds, so `max_requests` bounds
    /// accumulated successes and concurrent probes are not limited
    OnSuccess,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Half-open successes needed to close
    pub success_threshold: u32,
    /// Time spent open before probing
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Probe slots while half-open
    pub max_requests: u32,
    /// Carried for configuration compatibility; transitions never read it
    #[serde(with = "duration_millis")]
    pub reset_interval: Duration,
    pub half_open_accounting: HalfOpenAccounting,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: DEFAULT_CIRCUIT_TIMEOUT,
            max_requests: DEFAULT_HALF_OPEN_REQUESTS,
            reset_interval: DEFAULT_RESET_INTERVAL,
            half_open_accounting: HalfOpenAccounting::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Preset for the LLM agent client: trips faster, probes sooner
    pub fn for_agent() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            max_requests: 2,
            reset_interval: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Preset for the MCP tool client
    pub fn for_mcp() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(45),
            max_requests: 3,
            reset_interval: Duration::from_secs(45),
            ..Self::default()
        }
    }

    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }

        if self.max_requests == 0 {
            return Err(ConfigError::invalid("max_requests must be greater than 0"));
        }

        if self.half_open_accounting == HalfOpenAccounting::OnAdmission
            && self.success_threshold > self.max_requests
        {
            return Err(ConfigError::invalid(format!(
                "success_threshold ({}) cannot exceed max_requests ({}) when probes are counted on admission",
                self.success_threshold, self.max_requests
            )));
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.config.reset_interval = interval;
        self
    }

    pub fn half_open_accounting(mut self, accounting: HalfOpenAccounting) -> Self {
        self.config.half_open_accounting = accounting;
        self
    }

    /// Switch to building a breaker driven by `clock` (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock {
            config: self.config,
            clock,
            name: DEFAULT_BREAKER_NAME.to_string(),
        }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with a custom clock that produces a [`CircuitBreaker`] directly
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
    name: String,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.config.reset_interval = interval;
        self
    }

    pub fn half_open_accounting(mut self, accounting: HalfOpenAccounting) -> Self {
        self.config.half_open_accounting = accounting;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        Ok(CircuitBreaker::with_clock(self.config, self.clock)?.with_name(self.name))
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    /// Wall-clock time of the last failure (or of construction/reset)
    pub last_failure: SystemTime,
    pub half_open_requests: u32,
}

/// Callback invoked as `(old, new)` on every state change
///
/// Runs while the breaker's exclusive lock is held: it must not call back into
/// the same breaker or it deadlocks.
pub type StateChangeCallback = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    half_open_requests: u32,
    /// Bumped on every transition; ties a probe slot to its half-open period
    epoch: u64,
    last_failure_at: Instant,
    last_failure_time: SystemTime,
    on_state_change: Option<StateChangeCallback>,
}

/// Circuit breaker for one protected dependency
///
/// Clones are handles onto the same state, so one breaker can be handed to
/// every task that talks to the dependency.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<BreakerState>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("success_count", &inner.success_count)
            .field("half_open_requests", &inner.half_open_requests)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker with [`CircuitBreakerConfig::default`]
    pub fn with_defaults() -> Self {
        Self::from_parts(CircuitBreakerConfig::default(), SystemClock)
    }

    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: CircuitBreakerConfig, clock: C) -> Self {
        let inner = BreakerState {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_requests: 0,
            epoch: 0,
            last_failure_at: clock.now(),
            last_failure_time: clock.system_time(),
            on_state_change: None,
        };

        Self {
            name: Arc::from(DEFAULT_BREAKER_NAME),
            config,
            inner: Arc::new(RwLock::new(inner)),
            clock: Arc::new(clock),
        }
    }

    /// Label this breaker in log output
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register the state change callback, replacing any previous one
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.inner.write().on_state_change = Some(Arc::new(callback));
    }

    /// Execute an async operation under breaker protection
    ///
    /// When the breaker refuses the call the operation is never invoked and
    /// [`ResilienceError::CircuitOpen`] is returned. Otherwise the operation
    /// runs once, its outcome is recorded, and its error (if any) is returned
    /// untouched inside [`ResilienceError::OperationFailed`].
    ///
    /// Dropping the returned future after admission records nothing; a
    /// half-open probe slot it held is handed back.
    #[instrument(skip(self, operation), fields(breaker = %self.name, state = %self.get_state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(slot) = self.acquire() else {
            debug!(breaker = %self.name, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        };

        let result = operation().await;
        slot.complete();
        self.settle(result)
    }

    /// Execute a synchronous operation under breaker protection
    #[instrument(skip(self, operation), fields(breaker = %self.name, state = %self.get_state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(slot) = self.acquire() else {
            debug!(breaker = %self.name, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        };

        let result = operation();
        slot.complete();
        self.settle(result)
    }

    fn acquire(&self) -> Option<ProbeSlot<'_, C>> {
        match self.admit() {
            Admission::Rejected => None,
            Admission::Admitted => Some(ProbeSlot { breaker: self, epoch: None }),
            Admission::Probe { epoch } => Some(ProbeSlot { breaker: self, epoch: Some(epoch) }),
        }
    }

    fn settle<T, E>(&self, result: Result<T, E>) -> ResilienceResult<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                debug!(breaker = %self.name, error = %error, "Protected operation failed");
                self.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Decide whether a call may proceed
    ///
    /// May transition Open → HalfOpen once the timeout has elapsed, and under
    /// [`HalfOpenAccounting::OnAdmission`] consumes a probe slot. A caller
    /// that is admitted here owns that slot until it records an outcome.
    pub fn allow_request(&self) -> bool {
        !matches!(self.admit(), Admission::Rejected)
    }

    fn admit(&self) -> Admission {
        let inner = self.inner.read();
        let state = inner.state;

        match state {
            CircuitState::Closed => Admission::Admitted,
            CircuitState::HalfOpen => {
                drop(inner);
                self.admit_probe()
            }
            CircuitState::Open => {
                if !self.open_timeout_elapsed(&inner) {
                    return Admission::Rejected;
                }
                drop(inner);

                let mut first_probe = None;
                {
                    let mut inner = self.inner.write();
                    if inner.state == CircuitState::Open && self.open_timeout_elapsed(&inner) {
                        self.transition_to(&mut inner, CircuitState::HalfOpen);
                        if self.config.half_open_accounting == HalfOpenAccounting::OnAdmission {
                            inner.half_open_requests = 1;
                            first_probe = Some(Admission::Probe { epoch: inner.epoch });
                        }
                    }
                }

                let inner = self.inner.read();
                if inner.state != CircuitState::HalfOpen {
                    return Admission::Rejected;
                }
                if let Some(admission) = first_probe {
                    return admission;
                }
                drop(inner);
                self.admit_probe()
            }
        }
    }

    fn admit_probe(&self) -> Admission {
        match self.config.half_open_accounting {
            HalfOpenAccounting::OnSuccess => {
                let inner = self.inner.read();
                let state = inner.state;
                match state {
                    CircuitState::Closed => Admission::Admitted,
                    CircuitState::Open => Admission::Rejected,
                    CircuitState::HalfOpen if inner.half_open_requests < self.config.max_requests => {
                        Admission::Admitted
                    }
                    CircuitState::HalfOpen => Admission::Rejected,
                }
            }
            HalfOpenAccounting::OnAdmission => {
                let mut inner = self.inner.write();
                let state = inner.state;
                match state {
                    CircuitState::Closed => Admission::Admitted,
                    CircuitState::Open => Admission::Rejected,
                    CircuitState::HalfOpen if inner.half_open_requests < self.config.max_requests => {
                        inner.half_open_requests += 1;
                        Admission::Probe { epoch: inner.epoch }
                    }
                    CircuitState::HalfOpen => Admission::Rejected,
                }
            }
        }
    }

    /// Hand back a slot whose probe never recorded an outcome. Slots from an
    /// earlier half-open period are stale and ignored.
    fn release_probe(&self, epoch: u64) {
        let mut inner = self.inner.write();
        if inner.state == CircuitState::HalfOpen && inner.epoch == epoch {
            inner.half_open_requests = inner.half_open_requests.saturating_sub(1);
            debug!(breaker = %self.name, "Released abandoned half-open probe slot");
        }
    }

    fn open_timeout_elapsed(&self, inner: &BreakerState) -> bool {
        self.clock.now().saturating_duration_since(inner.last_failure_at) >= self.config.timeout
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.success_count = inner.success_count.saturating_add(1);
        let state = inner.state;

        match state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                if self.config.half_open_accounting == HalfOpenAccounting::OnSuccess {
                    inner.half_open_requests = inner.half_open_requests.saturating_add(1);
                }
                if inner.success_count >= u64::from(self.config.success_threshold) {
                    let successes = inner.success_count;
                    self.transition_to(&mut inner, CircuitState::Closed);
                    info!(breaker = %self.name, successes, "Circuit breaker closed");
                }
            }
            // A call admitted before the breaker opened finished late
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = self.clock.now();
        inner.last_failure_time = self.clock.system_time();
        let state = inner.state;

        match state {
            CircuitState::Closed => {
                if inner.failure_count >= u64::from(self.config.failure_threshold) {
                    let failures = inner.failure_count;
                    self.transition_to(&mut inner, CircuitState::Open);
                    warn!(breaker = %self.name, failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(&mut inner, CircuitState::Open);
                warn!(breaker = %self.name, "Circuit breaker reopened after half-open failure");
            }
            CircuitState::Open => {}
        }
    }

    /// Swap state, reset the counters the new state starts from, and fire
    /// the callback. Caller holds the exclusive lock.
    ///
    /// Successes survive Closed → Open → HalfOpen; only closing or a failed
    /// half-open period clears them.
    fn transition_to(&self, inner: &mut BreakerState, new_state: CircuitState) {
        let old_state = inner.state;
        inner.state = new_state;
        inner.epoch = inner.epoch.wrapping_add(1);

        match new_state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.half_open_requests = 0;
            }
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Circuit breaker half-open, probing");
            }
            CircuitState::Open if old_state == CircuitState::HalfOpen => {
                inner.success_count = 0;
                inner.half_open_requests = 0;
            }
            CircuitState::Open => {}
        }

        if let Some(callback) = inner.on_state_change.clone() {
            callback(old_state, new_state);
        }
    }

    /// Force the breaker closed and clear every counter
    ///
    /// Fires the callback with the prior state even if it was already closed.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let old_state = inner.state;

        self.transition_to(&mut inner, CircuitState::Closed);
        inner.last_failure_at = self.clock.now();
        inner.last_failure_time = self.clock.system_time();

        info!(breaker = %self.name, from = %old_state, "Circuit breaker manually reset");
    }

    pub fn get_state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Alias for [`get_state`](Self::get_state)
    pub fn state(&self) -> CircuitState {
        self.get_state()
    }

    pub fn get_stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure: inner.last_failure_time,
            half_open_requests: inner.half_open_requests,
        }
    }

    /// Alias for [`get_stats`](Self::get_stats)
    pub fn stats(&self) -> CircuitBreakerStats {
        self.get_stats()
    }
}

enum Admission {
    Rejected,
    Admitted,
    /// Admitted into a half-open slot counted on admission
    Probe { epoch: u64 },
}

/// Admission held by an executing call
///
/// If the call is dropped or unwinds before [`complete`](Self::complete), a
/// half-open slot it consumed goes back to the breaker.
struct ProbeSlot<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    epoch: Option<u64>,
}

impl<C: Clock> ProbeSlot<'_, C> {
    fn complete(mut self) {
        self.epoch = None;
    }
}

impl<C: Clock> Drop for ProbeSlot<'_, C> {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            self.breaker.release_probe(epoch);
        }
    }
}
