//! HTTP transport: the base operation of every remote client pipeline.
//!
//! Sends `GET base/<path with id>` with the caller's deadline as the request
//! timeout, decodes the JSON body and maps every failure into the
//! `OperationError` taxonomy.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use lms_core::ErrorEnvelope;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tower::Service;
use url::Url;

use super::path::PathTemplate;
use crate::service::config::RemoteClientConfig;
use crate::service::operation::{Describe, OperationContext, OperationError};

/// One outbound call: the caller's context and the logical id to fetch.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub ctx: OperationContext,
    pub id: String,
}

impl Describe for RemoteRequest {
    fn method(&self) -> &'static str {
        self.ctx.method
    }

    fn fields(&self) -> String {
        format!("id={}", self.id)
    }
}

/// Shared `reqwest` client for all outbound calls of a process.
///
/// # Errors
///
/// `Configuration` if the TLS backend cannot be initialised.
pub fn build_http_client(config: &RemoteClientConfig) -> Result<reqwest::Client, OperationError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| OperationError::configuration(format!("http client: {e}")))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Maps a non-2xx status and its error message to the taxonomy.
pub(crate) fn classify_status(
    dependency: &'static str,
    entity: &'static str,
    id: &str,
    status: StatusCode,
    message: String,
) -> OperationError {
    if status == StatusCode::NOT_FOUND {
        OperationError::NotFound {
            entity,
            id: id.to_string(),
        }
    } else if status == StatusCode::TOO_MANY_REQUESTS || !status.is_client_error() {
        OperationError::RemoteUnavailable {
            dependency,
            reason: format!("{status}: {message}"),
        }
    } else {
        OperationError::Validation {
            reason: format!("{dependency} rejected {id:?}: {message}"),
        }
    }
}

fn classify_transport(dependency: &'static str, timeout_ms: u64, err: &reqwest::Error) -> OperationError {
    if err.is_timeout() {
        OperationError::RemoteTimeout {
            dependency,
            timeout_ms,
        }
    } else {
        OperationError::RemoteUnavailable {
            dependency,
            reason: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// `tower::Service` that performs the HTTP exchange and decodes `T`.
pub struct HttpTransport<T> {
    client: reqwest::Client,
    base: Url,
    path: Arc<PathTemplate>,
    dependency: &'static str,
    entity: &'static str,
    _response: PhantomData<fn() -> T>,
}

impl<T> Clone for HttpTransport<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base: self.base.clone(),
            path: Arc::clone(&self.path),
            dependency: self.dependency,
            entity: self.entity,
            _response: PhantomData,
        }
    }
}

impl<T> HttpTransport<T> {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base: Url,
        path: PathTemplate,
        dependency: &'static str,
        entity: &'static str,
    ) -> Self {
        Self {
            client,
            base,
            path: Arc::new(path),
            dependency,
            entity,
            _response: PhantomData,
        }
    }
}

impl<T> Service<RemoteRequest> for HttpTransport<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Response = T;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<T, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RemoteRequest) -> Self::Future {
        let url = self.path.resolve(&self.base, &req.id);
        let client = self.client.clone();
        let dependency = self.dependency;
        let entity = self.entity;

        Box::pin(async move {
            let url = url?;
            let RemoteRequest { ctx, id } = req;
            if ctx.cancel.is_cancelled() {
                return Err(OperationError::Cancelled);
            }
            let budget = ctx.remaining();
            if budget.is_zero() {
                return Err(OperationError::RemoteTimeout {
                    dependency,
                    timeout_ms: 0,
                });
            }
            let timeout_ms = millis(budget);

            let mut request = client.get(url).timeout(budget);
            if let Some(request_id) = &ctx.request_id {
                request = request.header("x-request-id", request_id);
            }

            let exchange = async {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| classify_transport(dependency, timeout_ms, &e))?;
                let status = resp.status();
                let body = resp
                    .bytes()
                    .await
                    .map_err(|e| classify_transport(dependency, timeout_ms, &e))?;
                if status.is_success() {
                    serde_json::from_slice::<T>(&body).map_err(|e| {
                        OperationError::RemoteUnavailable {
                            dependency,
                            reason: format!("malformed body: {e}"),
                        }
                    })
                } else {
                    let message = serde_json::from_slice::<ErrorEnvelope>(&body)
                        .map_or_else(|_| String::from_utf8_lossy(&body).into_owned(), |env| env.error);
                    Err(classify_status(dependency, entity, &id, status, message))
                }
            };

            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => Err(OperationError::Cancelled),
                res = tokio::time::timeout_at(ctx.deadline, exchange) => {
                    res.unwrap_or(Err(OperationError::RemoteTimeout { dependency, timeout_ms }))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let nf = classify_status("courses", "course", "9", StatusCode::NOT_FOUND, String::new());
        assert!(matches!(nf, OperationError::NotFound { entity: "course", id } if id == "9"));

        let bad = classify_status(
            "courses",
            "course",
            "x",
            StatusCode::BAD_REQUEST,
            "inconsistent IDs".to_string(),
        );
        assert!(matches!(bad, OperationError::Validation { reason } if reason.contains("inconsistent IDs")));

        let down = classify_status(
            "courses",
            "course",
            "1",
            StatusCode::INTERNAL_SERVER_ERROR,
            "db".to_string(),
        );
        assert!(matches!(down, OperationError::RemoteUnavailable { dependency: "courses", .. }));

        let busy = classify_status("courses", "course", "1", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(busy, OperationError::RemoteUnavailable { .. }));
    }
}
