//! Pipeline composition: wraps a base operation in an ordered decorator chain.
//!
//! Decorators are applied in the order given, so the last one listed is the
//! outermost wrapper and the first to see a call. A decorator closer to the
//! base only sees the calls every outer decorator let through.

use std::fmt;
use std::sync::Arc;

use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::circuit_breaker::{dependency_failure, CircuitBreaker, CircuitBreakerLayer};
use super::logging::LoggingLayer;
use super::metrics::{MetricsLayer, MetricsSink};
use super::rate_limit::{RateLimitLayer, TokenBucket};
use crate::service::config::ServerConfig;
use crate::service::operation::{
    Describe, Operation, OperationError, OperationResponse, Summarize,
};

/// Type-erased, cloneable operation. Every pipeline stage produces one.
pub type BoxOperation<Req = Operation, Res = OperationResponse> =
    BoxCloneSyncService<Req, Res, OperationError>;

type WrapFn<Req, Res> = dyn Fn(BoxOperation<Req, Res>) -> BoxOperation<Req, Res> + Send + Sync;

// ---------------------------------------------------------------------------
// Decorator
// ---------------------------------------------------------------------------

/// One cross-cutting concern, ready to wrap any [`BoxOperation`].
pub struct Decorator<Req = Operation, Res = OperationResponse> {
    name: &'static str,
    wrap: Arc<WrapFn<Req, Res>>,
}

impl<Req, Res> Clone for Decorator<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            wrap: Arc::clone(&self.wrap),
        }
    }
}

impl<Req, Res> fmt::Debug for Decorator<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator").field("name", &self.name).finish()
    }
}

impl<Req, Res> Decorator<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub fn new<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(BoxOperation<Req, Res>) -> BoxOperation<Req, Res> + Send + Sync + 'static,
    {
        Self {
            name,
            wrap: Arc::new(wrap),
        }
    }

    /// Erases a tower layer into a decorator.
    pub fn from_layer<L>(name: &'static str, layer: L) -> Self
    where
        L: Layer<BoxOperation<Req, Res>> + Send + Sync + 'static,
        L::Service: Service<Req, Response = Res, Error = OperationError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Req>>::Future: Send + 'static,
    {
        Self::new(name, move |inner| BoxCloneSyncService::new(layer.layer(inner)))
    }

    #[must_use]
    pub fn rate_limit(endpoint: &'static str, bucket: Arc<TokenBucket>) -> Self {
        Self::from_layer("rate_limit", RateLimitLayer::new(endpoint, bucket))
    }

    #[must_use]
    pub fn circuit_breaker(breaker: Arc<CircuitBreaker>) -> Self {
        Self::from_layer("circuit_breaker", CircuitBreakerLayer::new(breaker))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn apply(&self, inner: BoxOperation<Req, Res>) -> BoxOperation<Req, Res> {
        (self.wrap)(inner)
    }
}

impl<Req, Res> Decorator<Req, Res>
where
    Req: Describe + Send + 'static,
    Res: Summarize + Send + 'static,
{
    #[must_use]
    pub fn logging() -> Self {
        Self::from_layer("logging", LoggingLayer)
    }

    #[must_use]
    pub fn metrics(sink: Arc<dyn MetricsSink>) -> Self {
        Self::from_layer("metrics", MetricsLayer::new(sink))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Wraps `base` in `decorators`, last listed outermost.
///
/// Building does no I/O and has no side effects beyond allocating the chain.
///
/// # Errors
///
/// Returns `OperationError::Configuration` when `base` is `None`.
pub fn build_pipeline<S, Req, Res>(
    base: Option<S>,
    decorators: impl IntoIterator<Item = Decorator<Req, Res>>,
) -> Result<BoxOperation<Req, Res>, OperationError>
where
    S: Service<Req, Response = Res, Error = OperationError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    Res: Send + 'static,
{
    let base = base.ok_or_else(|| OperationError::configuration("pipeline has no base operation"))?;
    Ok(decorators
        .into_iter()
        .fold(BoxCloneSyncService::new(base), |svc, d| d.apply(svc)))
}

/// Accumulates decorators innermost first.
pub struct PipelineBuilder<Req = Operation, Res = OperationResponse> {
    decorators: Vec<Decorator<Req, Res>>,
}

impl<Req, Res> Default for PipelineBuilder<Req, Res> {
    fn default() -> Self {
        Self {
            decorators: Vec::new(),
        }
    }
}

impl<Req, Res> PipelineBuilder<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a decorator outside every decorator added so far.
    #[must_use]
    pub fn with(mut self, decorator: Decorator<Req, Res>) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Decorator names, innermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.decorators.iter().map(Decorator::name).collect()
    }

    /// # Errors
    ///
    /// See [`build_pipeline`].
    pub fn build<S>(self, base: Option<S>) -> Result<BoxOperation<Req, Res>, OperationError>
    where
        S: Service<Req, Response = Res, Error = OperationError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        build_pipeline(base, self.decorators)
    }
}

/// Standard chain for one inbound endpoint, innermost first:
/// logging, metrics, circuit breaker, rate limit.
///
/// The endpoint gets its own token bucket and breaker, so a noisy endpoint
/// never throttles or trips its neighbours.
///
/// # Errors
///
/// See [`build_pipeline`].
pub fn build_endpoint_pipeline<S>(
    base: S,
    method: &'static str,
    config: &ServerConfig,
    sink: Arc<dyn MetricsSink>,
) -> Result<BoxOperation, OperationError>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    let bucket = Arc::new(TokenBucket::from_config(config.endpoint_rate_limit));
    let breaker = Arc::new(
        CircuitBreaker::new(method, config.endpoint_breaker).with_classifier(dependency_failure),
    );
    PipelineBuilder::new()
        .with(Decorator::logging())
        .with(Decorator::metrics(sink))
        .with(Decorator::circuit_breaker(breaker))
        .with(Decorator::rate_limit(method, bucket))
        .build(Some(base))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
