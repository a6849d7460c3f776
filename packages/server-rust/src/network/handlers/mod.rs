//! HTTP handler definitions for the LMS services.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors), the [`ApiError`] response mapping and the glue every
//! resource handler uses to turn a request into an `Operation`.

pub mod accounts;
pub mod courses;
pub mod health;
pub mod students;

pub use health::{health_handler, liveness_handler, readiness_handler};

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lms_core::{ErrorEnvelope, Page};
use serde::Deserialize;

use super::middleware::REQUEST_ID_HEADER;
use super::ShutdownController;
use crate::service::{
    Operation, OperationContext, OperationError, OperationFactory, OperationResponse,
    OperationRouter, ServiceKind,
};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Which service this process runs.
    pub service: ServiceKind,
    /// One pipeline per registered method.
    pub router: OperationRouter,
    /// Builds the context (call id, deadline) of each call.
    pub factory: Arc<OperationFactory>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Runs one operation built from a fresh context for `method`.
    ///
    /// The context's token is cancelled when the handler future is dropped
    /// (client went away), which stops any fan-out still in progress.
    pub(crate) async fn run(
        &self,
        method: &'static str,
        request_id: RequestId,
        build: impl FnOnce(OperationContext) -> Operation,
    ) -> Result<OperationResponse, ApiError> {
        let _in_flight = self.shutdown.in_flight_guard();
        let ctx = self.factory.make_ctx(method, request_id.0);
        let _cancel_on_drop = ctx.cancel.clone().drop_guard();
        Ok(self.router.dispatch(build(ctx)).await?)
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The `x-request-id` set by the HTTP middleware, if any.
#[derive(Debug, Clone, Default)]
pub struct RequestId(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ))
    }
}

/// `?limit=&offset=` (also accepted capitalised). Values that do not
/// parse count as 0, so `?limit=abc` lists the default page.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default, alias = "Limit")]
    limit: Option<String>,
    #[serde(default, alias = "Offset")]
    offset: Option<String>,
}

impl ListParams {
    #[must_use]
    pub fn page(&self) -> Page {
        let number = |raw: &Option<String>| {
            raw.as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Page::new(number(&self.limit), number(&self.offset))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// An `OperationError` on its way out as `{"error": ...}` with the status
/// of its kind.
#[derive(Debug)]
pub struct ApiError(pub OperationError);

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(OperationError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(OperationError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorEnvelope::new(self.0.to_string()))).into_response()
    }
}

/// Renders a successful operation. `Deleted` has no body.
pub(crate) fn respond(result: Result<OperationResponse, ApiError>) -> Response {
    match result {
        Ok(OperationResponse::Deleted) => StatusCode::NO_CONTENT.into_response(),
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_are_lenient() {
        let params = ListParams {
            limit: Some("abc".to_string()),
            offset: Some("20".to_string()),
        };
        assert_eq!(params.page(), Page::new(0, 20));
        assert_eq!(params.page().limit, Page::DEFAULT_LIMIT);
        assert_eq!(ListParams::default().page(), Page::new(0, 0));
    }

    #[test]
    fn error_status_follows_kind() {
        let resp = ApiError(OperationError::Throttled {
            endpoint: "get_student",
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = ApiError(OperationError::CircuitOpen {
            dependency: "courses",
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn deleted_has_no_body() {
        let resp = respond(Ok(OperationResponse::Deleted));
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
