//! Per-call structured logging.
//!
//! One event per call with the method, the request fields, the result
//! summary or error and the elapsed time. The event is emitted from a drop
//! guard, so a call whose future is dropped still logs (as aborted).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{info, warn};

use crate::service::operation::{Describe, OperationError, Summarize};

/// Emits the log line for one call when dropped.
struct LogGuard {
    method: &'static str,
    fields: String,
    started: Instant,
    outcome: Option<Result<String, (String, &'static str)>>,
}

impl LogGuard {
    fn start(method: &'static str, fields: String) -> Self {
        Self {
            method,
            fields,
            started: Instant::now(),
            outcome: None,
        }
    }

    fn finish<T: Summarize>(&mut self, result: &Result<T, OperationError>) {
        self.outcome = Some(match result {
            Ok(resp) => Ok(resp.summary()),
            Err(err) => Err((err.to_string(), err.kind().as_str())),
        });
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let method = self.method;
        let fields = self.fields.as_str();
        match &self.outcome {
            Some(Ok(summary)) => {
                info!(method, fields, result = %summary, elapsed_ms, "call complete");
            }
            Some(Err((error, kind))) => {
                warn!(method, fields, error = %error, kind, elapsed_ms, "call failed");
            }
            None => warn!(method, fields, elapsed_ms, "call aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S, Req> Service<Req> for LoggingService<S>
where
    Req: Describe,
    S: Service<Req, Error = OperationError> + Send,
    S::Future: Send + 'static,
    S::Response: Summarize + Send + 'static,
{
    type Response = S::Response;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let mut guard = LogGuard::start(req.method(), req.fields());
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            guard.finish(&result);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::testing::{get_student, Ack, CountingService};

    #[tokio::test]
    async fn never_alters_the_result() {
        let ok = LoggingLayer.layer(CountingService::ok());
        assert_eq!(ok.oneshot(get_student("4")).await.unwrap(), Ack);

        let failing = LoggingLayer.layer(CountingService::failing());
        let err = failing.oneshot(get_student("4")).await.unwrap_err();
        assert!(matches!(err, OperationError::RemoteUnavailable { .. }));
    }

    #[test]
    fn guard_captures_summary_and_error_kind() {
        let mut guard = LogGuard::start("get_student", "id=4".to_string());
        guard.finish::<Ack>(&Err(OperationError::NotFound {
            entity: "student",
            id: "4".to_string(),
        }));
        assert!(matches!(
            &guard.outcome,
            Some(Err((msg, "not_found"))) if msg == "student 4 not found"
        ));

        guard.finish(&Ok(Ack));
        assert!(matches!(&guard.outcome, Some(Ok(s)) if s == "ack"));
    }
}
