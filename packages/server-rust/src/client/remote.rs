//! Typed clients for sibling services.
//!
//! A [`RemoteClient`] owns one pipeline: the HTTP transport wrapped in a
//! circuit breaker, then a rate limiter, then logging. Throttled calls never
//! reach the breaker. Limiter and breaker
//! state belong to the client and are shared by all of its clones, so every
//! caller in the process sees the same view of the dependency's health.

use std::marker::PhantomData;
use std::sync::Arc;

use lms_core::{Course, Student};
use serde::de::DeserializeOwned;
use tower::{Service, ServiceExt};

use super::path::{normalize_base, PathTemplate};
use super::transport::{HttpTransport, RemoteRequest};
use crate::service::config::RemoteClientConfig;
use crate::service::middleware::circuit_breaker::{dependency_failure, CircuitBreaker};
use crate::service::middleware::{build_pipeline, BoxOperation, Decorator, TokenBucket};
use crate::service::operation::{service_names, OperationContext, OperationError, Summarize};

/// Static description of one outbound endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Sibling service name; also names the breaker.
    pub dependency: &'static str,
    /// Method tag used in logs for outbound calls.
    pub method: &'static str,
    /// Entity named in `NotFound` errors.
    pub entity: &'static str,
    pub path: &'static str,
}

/// `GET /courses/{id}` on the courses service.
pub const GET_COURSE: RemoteEndpoint = RemoteEndpoint {
    dependency: service_names::COURSES,
    method: "remote.get_course",
    entity: "course",
    path: "/courses/{id}",
};

/// `GET /courses/{id}/students` on the students service.
pub const GET_COURSE_STUDENTS: RemoteEndpoint = RemoteEndpoint {
    dependency: service_names::STUDENTS,
    method: "remote.get_course_students",
    entity: "course",
    path: "/courses/{id}/students",
};

pub struct RemoteClient<T> {
    endpoint: RemoteEndpoint,
    pipeline: BoxOperation<RemoteRequest, T>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<TokenBucket>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteClient<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint,
            pipeline: self.pipeline.clone(),
            breaker: Arc::clone(&self.breaker),
            limiter: Arc::clone(&self.limiter),
            _entity: PhantomData,
        }
    }
}

pub type CourseClient = RemoteClient<Course>;
pub type CourseStudentsClient = RemoteClient<Vec<Student>>;

impl<T> RemoteClient<T>
where
    T: DeserializeOwned + Summarize + Send + 'static,
{
    /// Client with fresh limiter and breaker state built from `config`.
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid base URL or path template.
    pub fn new(
        http: reqwest::Client,
        base: &str,
        endpoint: RemoteEndpoint,
        config: &RemoteClientConfig,
    ) -> Result<Self, OperationError> {
        let limiter = Arc::new(TokenBucket::from_config(config.rate_limit));
        let breaker = Arc::new(
            CircuitBreaker::new(endpoint.dependency, config.breaker)
                .with_classifier(dependency_failure),
        );
        Self::with_state(http, base, endpoint, limiter, breaker)
    }

    /// Client sharing externally owned limiter and breaker state.
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid base URL or path template.
    pub fn with_state(
        http: reqwest::Client,
        base: &str,
        endpoint: RemoteEndpoint,
        limiter: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, OperationError> {
        let transport = HttpTransport::new(
            http,
            normalize_base(base)?,
            PathTemplate::parse(endpoint.path)?,
            endpoint.dependency,
            endpoint.entity,
        );
        Self::with_transport(transport, endpoint, limiter, breaker)
    }

    /// Client over any transport service, e.g. an in-process stub.
    ///
    /// # Errors
    ///
    /// Propagates pipeline assembly errors.
    pub fn with_transport<S>(
        transport: S,
        endpoint: RemoteEndpoint,
        limiter: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, OperationError>
    where
        S: Service<RemoteRequest, Response = T, Error = OperationError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let pipeline = build_pipeline(
            Some(transport),
            [
                Decorator::circuit_breaker(Arc::clone(&breaker)),
                Decorator::rate_limit(endpoint.method, Arc::clone(&limiter)),
                Decorator::logging(),
            ],
        )?;
        Ok(Self {
            endpoint,
            pipeline,
            breaker,
            limiter,
            _entity: PhantomData,
        })
    }

    /// Fetches the entity identified by `logical_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty id (nothing is sent), otherwise whatever
    /// the pipeline produces.
    pub async fn call(&self, ctx: &OperationContext, logical_id: &str) -> Result<T, OperationError> {
        if logical_id.is_empty() {
            return Err(OperationError::validation(format!(
                "empty identifier for {}",
                self.endpoint.method
            )));
        }
        let req = RemoteRequest {
            ctx: ctx.for_method(self.endpoint.method),
            id: logical_id.to_string(),
        };
        self.pipeline.clone().oneshot(req).await
    }
}

impl<T> RemoteClient<T> {
    #[must_use]
    pub fn endpoint(&self) -> RemoteEndpoint {
        self.endpoint
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
