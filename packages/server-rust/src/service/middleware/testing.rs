//! Shared stubs for middleware and pipeline tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tower::Service;

use crate::service::middleware::metrics::{MetricOutcome, MetricsSink};
use crate::service::operation::{
    service_names, Describe, Operation, OperationContext, OperationError, Summarize,
};

/// Response returned by [`CountingService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack;

impl Summarize for Ack {
    fn summary(&self) -> String {
        "ack".to_string()
    }
}

/// Request carrying only a method tag.
#[derive(Debug, Clone)]
pub struct Probe(pub &'static str);

impl Describe for Probe {
    fn method(&self) -> &'static str {
        self.0
    }

    fn fields(&self) -> String {
        String::new()
    }
}

/// Stub service that counts invocations and can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct CountingService {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingService {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let svc = Self::default();
        svc.set_failing(true);
        svc
    }

    /// Completes only after `delay`, so a test can drop the call midway.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<Req> Service<Req> for CountingService {
    type Response = Ack;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Ack, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Req) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.load(Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if failing {
                Err(OperationError::RemoteUnavailable {
                    dependency: "stub",
                    reason: "injected failure".to_string(),
                })
            } else {
                Ok(Ack)
            }
        })
    }
}

/// One sink call captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Count {
        name: &'static str,
        method: &'static str,
        outcome: MetricOutcome,
    },
    Observe {
        name: &'static str,
        method: &'static str,
        seconds: f64,
    },
}

/// Metrics sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn count(&self, name: &'static str, method: &'static str, outcome: MetricOutcome) {
        self.events.lock().push(Recorded::Count {
            name,
            method,
            outcome,
        });
    }

    fn observe(&self, name: &'static str, method: &'static str, seconds: f64) {
        self.events.lock().push(Recorded::Observe {
            name,
            method,
            seconds,
        });
    }
}

pub fn make_ctx(method: &'static str) -> OperationContext {
    OperationContext::new(7, service_names::STUDENTS, method, Duration::from_secs(5))
}

pub fn get_student(id: &str) -> Operation {
    Operation::GetStudent {
        ctx: make_ctx(crate::service::operation::methods::GET_STUDENT),
        id: id.to_string(),
    }
}
