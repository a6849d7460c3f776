//! Request counting and latency instrumentation.
//!
//! [`MetricsLayer`] reports every call to a [`MetricsSink`]: one counter
//! increment tagged with the outcome and one latency observation. The
//! recording happens in [`CallTimer`]'s `Drop`, so calls that are cancelled
//! or panic are still counted (as `aborted`).

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use lms_core::ErrorKind;
use tokio::time::Instant;
use tower::{Layer, Service};

use crate::service::operation::{Describe, OperationError};

pub const REQUESTS_TOTAL: &str = "lms_requests_total";
pub const REQUEST_DURATION: &str = "lms_request_duration_seconds";

/// How a call ended, as reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOutcome {
    Ok,
    Failed(ErrorKind),
    /// The future was dropped before it produced a result.
    Aborted,
}

impl MetricOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed(kind) => kind.as_str(),
            Self::Aborted => "aborted",
        }
    }
}

/// Destination for counters and latency observations.
pub trait MetricsSink: Send + Sync + 'static {
    fn count(&self, name: &'static str, method: &'static str, outcome: MetricOutcome);
    fn observe(&self, name: &'static str, method: &'static str, seconds: f64);
}

// ---------------------------------------------------------------------------
// PrometheusSink
// ---------------------------------------------------------------------------

/// Forwards to the `metrics` facade, labelled with the service name.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink {
    service: &'static str,
}

impl PrometheusSink {
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl MetricsSink for PrometheusSink {
    fn count(&self, name: &'static str, method: &'static str, outcome: MetricOutcome) {
        metrics::counter!(
            name,
            "service" => self.service,
            "method" => method,
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    fn observe(&self, name: &'static str, method: &'static str, seconds: f64) {
        metrics::histogram!(name, "service" => self.service, "method" => method).record(seconds);
    }
}

/// Installs the Prometheus recorder and its scrape listener on `addr`.
///
/// # Errors
///
/// Fails when a recorder is already installed or the listener cannot bind.
pub fn init_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    metrics::describe_counter!(REQUESTS_TOTAL, "Operations handled, by method and outcome");
    metrics::describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Operation latency, by method"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// CallTimer
// ---------------------------------------------------------------------------

/// Records one call on drop. Set the outcome with [`CallTimer::finish`].
pub struct CallTimer {
    sink: Arc<dyn MetricsSink>,
    method: &'static str,
    started: Instant,
    outcome: MetricOutcome,
}

impl CallTimer {
    #[must_use]
    pub fn start(sink: Arc<dyn MetricsSink>, method: &'static str) -> Self {
        Self {
            sink,
            method,
            started: Instant::now(),
            outcome: MetricOutcome::Aborted,
        }
    }

    pub fn finish<T>(&mut self, result: &Result<T, OperationError>) {
        self.outcome = match result {
            Ok(_) => MetricOutcome::Ok,
            Err(err) => MetricOutcome::Failed(err.kind()),
        };
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        let seconds = self.started.elapsed().as_secs_f64();
        self.sink.count(REQUESTS_TOTAL, self.method, self.outcome);
        self.sink.observe(REQUEST_DURATION, self.method, seconds);
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MetricsLayer {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            sink: Arc::clone(&self.sink),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    sink: Arc<dyn MetricsSink>,
}

impl<S, Req> Service<Req> for MetricsService<S>
where
    Req: Describe,
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
        let mut timer = CallTimer::start(Arc::clone(&self.sink), req.method());
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            timer.finish(&result);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::testing::{CountingService, Probe, Recorded, RecordingSink};

    fn layer(sink: &RecordingSink) -> MetricsLayer {
        MetricsLayer::new(Arc::new(sink.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn records_failure_with_method_and_duration() {
        let sink = RecordingSink::default();
        let stub = CountingService::failing().with_delay(Duration::from_millis(40));
        let svc = layer(&sink).layer(stub);

        let err = svc.oneshot(Probe("get_course")).await.unwrap_err();
        assert!(matches!(err, OperationError::RemoteUnavailable { .. }));

        let events = sink.events();
        assert_eq!(
            events[0],
            Recorded::Count {
                name: REQUESTS_TOTAL,
                method: "get_course",
                outcome: MetricOutcome::Failed(ErrorKind::RemoteUnavailable),
            }
        );
        match events[1] {
            Recorded::Observe {
                name,
                method,
                seconds,
            } => {
                assert_eq!(name, REQUEST_DURATION);
                assert_eq!(method, "get_course");
                assert!(seconds > 0.0);
            }
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_success_through() {
        let sink = RecordingSink::default();
        let svc = layer(&sink).layer(CountingService::ok());
        svc.oneshot(Probe("list_courses")).await.unwrap();
        assert!(matches!(
            sink.events()[0],
            Recorded::Count {
                outcome: MetricOutcome::Ok,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_is_recorded_as_aborted() {
        let sink = RecordingSink::default();
        let stub = CountingService::ok().with_delay(Duration::from_secs(10));
        let svc = layer(&sink).layer(stub);

        let res = tokio::time::timeout(Duration::from_secs(1), svc.oneshot(Probe("get_student")))
            .await;
        assert!(res.is_err());
        assert!(matches!(
            sink.events()[0],
            Recorded::Count {
                outcome: MetricOutcome::Aborted,
                method: "get_student",
                ..
            }
        ));
    }
}
