//! Token-bucket admission control.
//!
//! Every call tries to take one token without waiting. When the bucket is
//! empty the call fails immediately with `OperationError::Throttled` and the
//! wrapped service is never invoked.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::config::RateLimitConfig;
use crate::service::operation::OperationError;

// ---------------------------------------------------------------------------
// TokenBucket
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuously refilled token bucket. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    refill_per_sec: f64,
    burst: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            refill_per_sec: refill_per_sec.max(0.0),
            burst,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: RateLimitConfig) -> Self {
        Self::new(config.refill_per_sec, config.burst)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(f64::from(self.burst));
        state.last_refill = now;
    }

    /// Takes one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available.
    #[must_use]
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = state.tokens.floor() as u32;
        whole
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

// ---------------------------------------------------------------------------
// RateLimitLayer
// ---------------------------------------------------------------------------

/// Tower layer that rejects calls once the shared bucket is empty.
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    endpoint: &'static str,
    bucket: Arc<TokenBucket>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(endpoint: &'static str, bucket: Arc<TokenBucket>) -> Self {
        Self { endpoint, bucket }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            endpoint: self.endpoint,
            bucket: Arc::clone(&self.bucket),
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    endpoint: &'static str,
    bucket: Arc<TokenBucket>,
}

impl<S, Req> Service<Req> for RateLimitService<S>
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
        if !self.bucket.try_acquire() {
            let endpoint = self.endpoint;
            warn!(endpoint, "rate limit exceeded");
            return Box::pin(async move { Err(OperationError::Throttled { endpoint }) });
        }
        Box::pin(self.inner.call(req))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
