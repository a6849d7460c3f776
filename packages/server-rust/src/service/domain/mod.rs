//! Domain services: the base operations behind each inbound endpoint.
//!
//! Each service is a plain struct with an async `handle` method. The
//! `operation_service!` macro turns `Arc<Service>` into a cloneable
//! `tower::Service<Operation>` so it can sit at the bottom of a pipeline.
//! [`register_endpoints`] gives every method its own pipeline.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::client::{build_http_client, RemoteClient, RemoteEndpoint, GET_COURSE, GET_COURSE_STUDENTS};
use crate::service::config::{ServerConfig, ServiceKind};
use crate::service::middleware::{build_endpoint_pipeline, MetricsSink};
use crate::service::operation::{Operation, OperationError, OperationResponse, Summarize};
use crate::service::router::OperationRouter;
use crate::storage::MemoryStore;

/// Rows fetched when a relation is read in full (enrollments, roster).
pub(crate) const RELATION_SCAN_LIMIT: u32 = 1000;

/// Implements `tower::Service<Operation>` for `Arc<$name>` by delegating to
/// `$name::handle`.
macro_rules! operation_service {
    ($name:ident) => {
        impl tower::Service<crate::service::operation::Operation> for std::sync::Arc<$name> {
            type Response = crate::service::operation::OperationResponse;
            type Error = crate::service::operation::OperationError;
            type Future = std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
            >;

            fn poll_ready(
                &mut self,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<Result<(), Self::Error>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn call(&mut self, op: crate::service::operation::Operation) -> Self::Future {
                let svc = std::sync::Arc::clone(self);
                Box::pin(async move { svc.handle(op).await })
            }
        }
    };
}

pub mod accounts;
pub mod courses;
pub mod students;

pub use accounts::AccountService;
pub use courses::CourseService;
pub use students::StudentService;

/// Builds one pipeline per method around `service` and registers it.
///
/// # Errors
///
/// Propagates pipeline assembly errors.
pub fn register_endpoints<S>(
    router: &mut OperationRouter,
    methods: &[&'static str],
    service: &S,
    config: &ServerConfig,
    sink: &Arc<dyn MetricsSink>,
) -> Result<(), OperationError>
where
    S: tower::Service<Operation, Response = OperationResponse, Error = OperationError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    for &method in methods {
        let pipeline = build_endpoint_pipeline(service.clone(), method, config, Arc::clone(sink))?;
        router.register(method, pipeline);
    }
    Ok(())
}

/// Wires the service selected by `config.service` over `store` and
/// registers one pipeline per method it owns.
///
/// # Errors
///
/// `Configuration` for an invalid peer URL or pipeline.
pub fn build_operation_router(
    config: &ServerConfig,
    store: Arc<MemoryStore>,
    sink: Arc<dyn MetricsSink>,
) -> Result<OperationRouter, OperationError> {
    let mut router = OperationRouter::new();
    match config.service {
        ServiceKind::Students => {
            let courses = peer_client(config, GET_COURSE)?;
            let service = Arc::new(StudentService::new(store, courses, config.fan_out));
            register_endpoints(&mut router, StudentService::METHODS, &service, config, &sink)?;
        }
        ServiceKind::Courses => {
            let students = peer_client(config, GET_COURSE_STUDENTS)?;
            let service = Arc::new(CourseService::new(store, students));
            register_endpoints(&mut router, CourseService::METHODS, &service, config, &sink)?;
        }
        ServiceKind::Accounts => {
            let service = Arc::new(AccountService::new(store));
            register_endpoints(&mut router, AccountService::METHODS, &service, config, &sink)?;
        }
    }
    Ok(router)
}

fn peer_client<T>(
    config: &ServerConfig,
    endpoint: RemoteEndpoint,
) -> Result<Option<RemoteClient<T>>, OperationError>
where
    T: DeserializeOwned + Summarize + Send + 'static,
{
    let Some(base) = config.peer_url.as_deref() else {
        return Ok(None);
    };
    let http = build_http_client(&config.remote)?;
    RemoteClient::new(http, base, endpoint, &config.remote).map(Some)
}

/// Error for an operation routed to a service that does not own it.
pub(crate) fn not_handled(op: &Operation) -> OperationError {
    OperationError::UnknownMethod {
        method: op.ctx().method.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::middleware::testing::RecordingSink;
    use crate::service::operation::methods;

    fn router_for(service: ServiceKind, peer_url: Option<&str>) -> OperationRouter {
        let config = ServerConfig {
            service,
            peer_url: peer_url.map(str::to_string),
            ..ServerConfig::default()
        };
        build_operation_router(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingSink::default()),
        )
        .unwrap()
    }

    #[test]
    fn each_kind_registers_its_methods() {
        let accounts = router_for(ServiceKind::Accounts, None);
        assert_eq!(
            accounts.methods(),
            vec![methods::CREATE_ACCOUNT, methods::GET_ACCOUNT, methods::UPDATE_ACCOUNT]
        );

        let courses = router_for(ServiceKind::Courses, Some("localhost:8082"));
        assert_eq!(courses.methods().len(), CourseService::METHODS.len());
        assert!(courses.methods().contains(&methods::GET_COURSE_STUDENTS));

        let students = router_for(ServiceKind::Students, Some("localhost:8081"));
        assert_eq!(students.methods().len(), StudentService::METHODS.len());
    }

    #[test]
    fn bad_peer_url_is_a_configuration_error() {
        let config = ServerConfig {
            service: ServiceKind::Students,
            peer_url: Some("http://".to_string()),
            ..ServerConfig::default()
        };
        let err = build_operation_router(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingSink::default()),
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::Configuration { .. }));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use lms_core::Course;

    use crate::client::{CourseClient, RemoteRequest, GET_COURSE};
    use crate::service::config::CircuitBreakerConfig;
    use crate::service::middleware::{CircuitBreaker, TokenBucket};
    use crate::service::operation::OperationError;

    /// Course client answering from a fixed catalogue without a network.
    /// Ids listed in `missing` return `NotFound`; `"13"` fails as unavailable.
    pub fn stub_course_client(missing: &'static [&'static str]) -> CourseClient {
        let transport = tower::service_fn(move |req: RemoteRequest| async move {
            if missing.contains(&req.id.as_str()) {
                return Err(OperationError::NotFound {
                    entity: "course",
                    id: req.id,
                });
            }
            if req.id == "13" {
                return Err(OperationError::RemoteUnavailable {
                    dependency: "courses",
                    reason: "connection refused".to_string(),
                });
            }
            Ok(Course {
                id: req.id.parse().unwrap_or_default(),
                name: format!("course {}", req.id),
            })
        });
        CourseClient::with_transport(
            transport,
            GET_COURSE,
            Arc::new(TokenBucket::new(1.0, 100)),
            Arc::new(CircuitBreaker::new("courses", CircuitBreakerConfig::default())),
        )
        .unwrap()
    }
}
