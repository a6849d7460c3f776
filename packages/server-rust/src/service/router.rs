//! Operation routing: dispatches `Operation` to the pipeline registered for
//! its method.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Service, ServiceExt};

use super::middleware::BoxOperation;
use super::operation::{Operation, OperationError, OperationResponse};

/// Routes `Operation` values to per-endpoint pipelines keyed by method tag.
///
/// Every inbound endpoint has its own pipeline (own limiter, own breaker), so
/// the router is a flat map from method to [`BoxOperation`]. Operations whose
/// method has no pipeline return `OperationError::UnknownMethod`.
#[derive(Clone, Default)]
pub struct OperationRouter {
    endpoints: HashMap<&'static str, BoxOperation>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the pipeline for `method`, replacing any previous one.
    pub fn register(&mut self, method: &'static str, pipeline: BoxOperation) {
        self.endpoints.insert(method, pipeline);
    }

    /// Registered methods, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.endpoints.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Runs `op` through the pipeline registered for its method.
    ///
    /// # Errors
    ///
    /// Whatever the pipeline returns, or `UnknownMethod`.
    pub async fn dispatch(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let method = op.ctx().method;
        let Some(pipeline) = self.endpoints.get(method) else {
            return Err(OperationError::UnknownMethod {
                method: method.to_string(),
            });
        };
        pipeline.clone().oneshot(op).await
    }
}

impl fmt::Debug for OperationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRouter")
            .field("methods", &self.methods())
            .finish()
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked per pipeline inside `dispatch`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { router.dispatch(op).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lms_core::Course;
    use tower::util::BoxCloneSyncService;

    use super::*;
    use crate::service::middleware::testing::{get_student, make_ctx};
    use crate::service::operation::methods;

    fn answering(name: &'static str) -> BoxOperation {
        BoxCloneSyncService::new(tower::service_fn(move |op: Operation| async move {
            Ok::<_, OperationError>(OperationResponse::Course(Course {
                id: i64::try_from(op.ctx().call_id).unwrap_or_default(),
                name: name.to_string(),
            }))
        }))
    }

    #[tokio::test]
    async fn routes_by_method() {
        let mut router = OperationRouter::new();
        router.register(methods::GET_STUDENT, answering("student"));
        router.register(methods::GET_COURSE, answering("course"));

        let resp = router.dispatch(get_student("1")).await.unwrap();
        assert!(matches!(resp, OperationResponse::Course(c) if c.name == "student"));

        let op = Operation::GetCourse {
            ctx: make_ctx(methods::GET_COURSE),
            id: "2".to_string(),
        };
        let resp = router.clone().oneshot(op).await.unwrap();
        assert!(matches!(resp, OperationResponse::Course(c) if c.name == "course"));
    }

    #[tokio::test]
    async fn unknown_method_returns_error() {
        let mut router = OperationRouter::new();
        router.register(methods::GET_COURSE, answering("course"));

        let err = router.dispatch(get_student("1")).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::UnknownMethod { method } if method == "get_student"
        ));
    }

    #[test]
    fn lists_registered_methods() {
        let mut router = OperationRouter::new();
        router.register(methods::LIST_COURSES, answering("a"));
        router.register(methods::GET_COURSE, answering("b"));
        assert_eq!(router.methods(), vec!["get_course", "list_courses"]);
    }

    #[test]
    fn debug_lists_methods() {
        let mut router = OperationRouter::new();
        router.register(methods::GET_COURSE, answering("b"));
        assert_eq!(
            format!("{router:?}"),
            r#"OperationRouter { methods: ["get_course"] }"#
        );
    }
}
