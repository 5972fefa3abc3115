//! Circuit breaker for downstream dependencies.
//!
//! Stops calling a dependency that keeps failing until a cooldown has passed
//! and a single probe call succeeds.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (cooldown elapsed, next call becomes the probe)
//! HALF_OPEN → CLOSED (probe succeeds)
//! HALF_OPEN → OPEN (probe fails, cooldown restarts)
//! ```
//!
//! Only transient failures count. A fatal error means the dependency
//! answered, so it is recorded as a success.
//!
//! # Example
//!
//! ```rust,ignore
//! use transfer_engine::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("ledger", CircuitBreakerConfig::default());
//! let balance = breaker.call(|| ledger.get_balance(&account)).await?;
//! ```

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{CircuitBreakerError, Classify};
use crate::observability::metrics::{self, circuit_breaker_state};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Circuit is closed, calls flow normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit admits a single probe call.
    HalfOpen,
}

impl CircuitBreakerState {
    const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => circuit_breaker_state::CLOSED,
            Self::Open => circuit_breaker_state::OPEN,
            Self::HalfOpen => circuit_breaker_state::HALF_OPEN,
        }
    }
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures that open the circuit.
    pub failure_threshold: u32,
    /// Time to stay in `OPEN` before admitting a probe.
    pub cooldown: Duration,
    /// Maximum duration of an admitted call, if any.
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            call_timeout: None,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker guarding one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Dependency name for logging.
    name: String,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// State, guarded by a lock that is never held across an await.
    inner: Mutex<BreakerInner>,
    /// Total admitted calls (for metrics).
    total_calls: AtomicU64,
    /// Total counted failures (for metrics).
    total_failures: AtomicU64,
    /// Calls rejected without invoking the operation (for metrics).
    total_rejections: AtomicU64,
    /// State transitions counter (for metrics).
    state_transitions: AtomicU64,
}

/// Admission ticket for one call through a [`CircuitBreaker`].
///
/// Obtained from [`CircuitBreaker::try_acquire`] and consumed by
/// [`CallPermit::run`]. Dropping an unfinished probe permit frees the probe
/// slot without changing state.
#[derive(Debug)]
#[must_use = "a permit does nothing unless run"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the `HALF_OPEN` probe.
    #[must_use]
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    /// Await the admitted call and record its outcome.
    pub async fn run<T, E, Fut>(mut self, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitBreakerError>,
    {
        let result = match self.breaker.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(E::from(CircuitBreakerError::Timeout {
                    name: self.breaker.name.clone(),
                    timeout_ms: limit.as_millis() as u64,
                })),
            },
            None => call.await,
        };

        let failed = matches!(&result, Err(error) if error.is_transient());
        self.settled = true;
        if failed {
            self.breaker.record_failure(self.probe);
        } else {
            self.breaker.record_success(self.probe);
        }
        result
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe();
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                opened_at: None,
                probe_in_flight: false,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the dependency name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state.
    ///
    /// An `OPEN` circuit whose cooldown has elapsed reports `OPEN` until the
    /// next call is admitted as the probe.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    /// Consecutive failures counted since the last success.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// When the last counted failure happened.
    #[must_use]
    pub fn last_failure(&self) -> Option<Instant> {
        self.lock().last_failure
    }

    /// Run `operation` through the breaker.
    ///
    /// When the circuit rejects the call, `operation` is never invoked and
    /// the error is `E::from(CircuitBreakerError::Open { .. })`.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitBreakerError>,
    {
        let permit = self.try_acquire().map_err(E::from)?;
        permit.run(operation()).await
    }

    /// Ask for admission of one call.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` when the circuit is open and
    /// cooling down, or when a probe is already in flight.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitBreakerError> {
        let mut inner = self.lock();
        let state = inner.state;
        let mut probing_started = false;
        let admitted = match state {
            CircuitBreakerState::Closed => Some(false),
            CircuitBreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|opened| opened.elapsed() >= self.config.cooldown);
                if cooled {
                    inner.state = CircuitBreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    probing_started = true;
                    Some(true)
                } else {
                    None
                }
            }
            CircuitBreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(true)
                }
            }
        };
        drop(inner);

        if probing_started {
            self.announce(CircuitBreakerState::Open, CircuitBreakerState::HalfOpen);
        }

        match admitted {
            Some(probe) => {
                self.total_calls.fetch_add(1, Ordering::Relaxed);
                Ok(CallPermit {
                    breaker: self,
                    probe,
                    settled: false,
                })
            }
            None => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_breaker_rejected(&self.name);
                tracing::debug!(name = %self.name, "Call rejected by open circuit");
                Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Record a successful (or fatally failed) call.
    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }

        // A call admitted while CLOSED can finish after the circuit opened;
        // only the probe may close it again.
        let transition = match inner.state {
            CircuitBreakerState::Closed => {
                inner.failure_count = 0;
                None
            }
            CircuitBreakerState::HalfOpen if probe => {
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.state = CircuitBreakerState::Closed;
                Some(CircuitBreakerState::HalfOpen)
            }
            _ => None,
        };
        drop(inner);

        if let Some(previous) = transition {
            self.announce(previous, CircuitBreakerState::Closed);
        }
    }

    /// Record a transient failure.
    fn record_failure(&self, probe: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_failure(&self.name);

        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }

        let now = Instant::now();
        let transition = match inner.state {
            CircuitBreakerState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.last_failure = Some(now);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitBreakerState::Open;
                    inner.opened_at = Some(now);
                    Some(CircuitBreakerState::Closed)
                } else {
                    None
                }
            }
            CircuitBreakerState::HalfOpen if probe => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.last_failure = Some(now);
                inner.state = CircuitBreakerState::Open;
                inner.opened_at = Some(now);
                Some(CircuitBreakerState::HalfOpen)
            }
            _ => None,
        };
        let failures = inner.failure_count;
        drop(inner);

        if let Some(previous) = transition {
            self.announce(previous, CircuitBreakerState::Open);
        } else {
            tracing::debug!(name = %self.name, failures, "Circuit breaker counted failure");
        }
    }

    /// Free the probe slot after an abandoned probe.
    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
        tracing::debug!(name = %self.name, "Probe abandoned before completion");
    }

    fn announce(&self, from: CircuitBreakerState, to: CircuitBreakerState) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_state(&self.name, to.gauge_value());
        match to {
            CircuitBreakerState::Open => tracing::warn!(
                name = %self.name,
                from = %from,
                to = "OPEN",
                "Circuit breaker opened"
            ),
            CircuitBreakerState::HalfOpen => tracing::info!(
                name = %self.name,
                from = %from,
                to = "HALF_OPEN",
                "Circuit breaker probing"
            ),
            CircuitBreakerState::Closed => tracing::info!(
                name = %self.name,
                from = %from,
                to = "CLOSED",
                "Circuit breaker closed"
            ),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get metrics for this circuit breaker.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        let state = inner.state;
        let failure_count = inner.failure_count;
        drop(inner);

        CircuitBreakerMetrics {
            name: self.name.clone(),
            state,
            failure_count,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit open (for testing or emergency).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitBreakerState::Open;
        inner.opened_at = Some(Instant::now());
        drop(inner);
        if previous != CircuitBreakerState::Open {
            self.announce(previous, CircuitBreakerState::Open);
        }
    }

    /// Force the circuit closed (for testing or recovery).
    pub fn force_close(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitBreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        drop(inner);
        if previous != CircuitBreakerState::Closed {
            self.announce(previous, CircuitBreakerState::Closed);
        }
    }
}

/// Metrics for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Consecutive failures.
    pub failure_count: u32,
    /// Total admitted calls.
    pub total_calls: u64,
    /// Total counted failures.
    pub total_failures: u64,
    /// Calls rejected without being invoked.
    pub total_rejections: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
}
