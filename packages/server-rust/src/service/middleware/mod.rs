//! Tower middleware layers for the operation pipeline.
//!
//! - [`rate_limit`]: token-bucket admission, rejects with `Throttled`
//! - [`circuit_breaker`]: per-dependency failure isolation, rejects with `CircuitOpen`
//! - [`logging`]: one structured event per call
//! - [`metrics`]: request counter and latency histogram via a [`MetricsSink`]
//! - [`pipeline`]: erases layers into [`Decorator`]s and composes them

pub mod circuit_breaker;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;

#[cfg(test)]
pub(crate) mod testing;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerLayer, CircuitState};
pub use logging::LoggingLayer;
pub use metrics::{MetricsLayer, MetricsSink, PrometheusSink};
pub use pipeline::{
    build_endpoint_pipeline, build_pipeline, BoxOperation, Decorator, PipelineBuilder,
};
pub use rate_limit::{RateLimitLayer, TokenBucket};
