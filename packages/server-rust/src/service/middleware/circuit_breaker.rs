//! Circuit breaker: stops calling a dependency that keeps failing.
//!
//! States move `Closed -> Open -> HalfOpen -> Closed`. One [`CircuitBreaker`]
//! exists per logical dependency and is shared by every clone of the layer
//! that wraps it.
//!
//! - `Closed`: calls pass. `failure_threshold` consecutive failures open it.
//! - `Open`: calls are rejected with `CircuitOpen` until `cool_down` elapses.
//! - `HalfOpen`: a single probe is let through. Success closes the breaker,
//!   failure re-opens it with a fresh `opened_at`. Other callers are rejected
//!   while the probe is in flight.
//!
//! A probe whose future is dropped before completing counts as a failure.
//! A probe that ends in an error the classifier ignores (it was throttled or
//! cancelled before reaching the dependency, say) settles nothing: the
//! breaker goes back to `Open` with its original `opened_at`, so the next
//! caller may probe again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use crate::service::config::CircuitBreakerConfig;
use crate::service::operation::OperationError;
use lms_core::ErrorKind;

/// Decides whether an error counts against the breaker.
pub type FailureClassifier = fn(&OperationError) -> bool;

/// Every error is a failure.
#[must_use]
pub fn any_error(_err: &OperationError) -> bool {
    true
}

/// Only errors that say something about the dependency's health count.
///
/// Bad input, missing rows, local throttling and caller cancellation leave
/// the breaker alone.
#[must_use]
pub fn dependency_failure(err: &OperationError) -> bool {
    !matches!(
        err.kind(),
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Throttled | ErrorKind::Cancelled
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    classifier: FailureClassifier,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            classifier: any_error,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    #[must_use]
    pub fn opened_at(&self) -> Option<Instant> {
        self.state.lock().opened_at
    }

    /// Admits a call or rejects it with `CircuitOpen`.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::CircuitOpen` while open, or while a half-open
    /// probe is already in flight.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, OperationError> {
        let mut st = self.state.lock();
        let probe = match st.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = st
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cool_down);
                if !cooled {
                    return Err(self.rejection());
                }
                st.state = CircuitState::HalfOpen;
                st.probe_in_flight = true;
                info!(breaker = self.name, "circuit half-open, probing");
                true
            }
            CircuitState::HalfOpen => {
                if st.probe_in_flight {
                    return Err(self.rejection());
                }
                st.probe_in_flight = true;
                true
            }
        };
        Ok(CallPermit {
            breaker: Arc::clone(self),
            probe,
            settled: false,
        })
    }

    fn rejection(&self) -> OperationError {
        debug!(breaker = self.name, "call rejected, circuit open");
        OperationError::CircuitOpen {
            dependency: self.name,
        }
    }

    fn on_result(&self, probe: bool, failed: bool) {
        let mut st = self.state.lock();
        if probe {
            st.probe_in_flight = false;
            if failed {
                st.state = CircuitState::Open;
                st.opened_at = Some(Instant::now());
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                warn!(breaker = self.name, "probe failed, circuit re-opened");
            } else {
                st.state = CircuitState::Closed;
                st.opened_at = None;
                st.consecutive_failures = 0;
                info!(breaker = self.name, "probe succeeded, circuit closed");
            }
            return;
        }

        // Late results from calls admitted before the breaker tripped do not
        // move it out of Open or HalfOpen.
        if st.state != CircuitState::Closed {
            return;
        }
        if failed {
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            if st.consecutive_failures >= self.config.failure_threshold {
                st.state = CircuitState::Open;
                st.opened_at = Some(Instant::now());
                warn!(
                    breaker = self.name,
                    failures = st.consecutive_failures,
                    "circuit opened"
                );
            }
        } else {
            st.consecutive_failures = 0;
        }
    }

    /// Returns an unsettled probe slot: back to `Open`, same `opened_at`.
    fn release_probe(&self) {
        let mut st = self.state.lock();
        if st.state == CircuitState::HalfOpen {
            st.state = CircuitState::Open;
        }
        st.probe_in_flight = false;
        debug!(breaker = self.name, "probe released without an outcome");
    }
}

// ---------------------------------------------------------------------------
// CallPermit
// ---------------------------------------------------------------------------

/// Admission ticket for one call. Settle it with [`CallPermit::record`].
///
/// Dropping an unsettled probe permit records a failed probe, so a cancelled
/// probe can never leave the breaker stuck in `HalfOpen`.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl CallPermit {
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Settles the call. Errors the classifier ignores leave the counters
    /// untouched and hand a probe slot back without closing the breaker.
    pub fn record<T>(mut self, result: &Result<T, OperationError>) {
        self.settled = true;
        match result {
            Ok(_) => self.breaker.on_result(self.probe, false),
            Err(err) if (self.breaker.classifier)(err) => self.breaker.on_result(self.probe, true),
            Err(_) if self.probe => self.breaker.release_probe(),
            Err(_) => {}
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_result(true, true);
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S, Req> Service<Req> for CircuitBreakerService<S>
where
    S: Service<Req, Error = OperationError> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            permit.record(&result);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
