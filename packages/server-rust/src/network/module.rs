//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. The bound port is known
//! after `start()`, so tests and the binary can log or publish it before
//! traffic arrives.

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    accounts, courses, health_handler, liveness_handler, readiness_handler, students, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::ServiceKind;

/// Manages the HTTP server lifecycle of one LMS service.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState) -> Self {
        Self {
            config,
            listener: None,
            state,
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Assembles the axum router for the configured service kind.
    ///
    /// Every kind serves `GET /health`, `/health/live` and `/health/ready`
    /// next to its resource routes.
    pub fn build_router(&self) -> Router {
        let routes = match self.state.service {
            ServiceKind::Students => Router::new()
                .route(
                    "/students",
                    get(students::list_students).post(students::create_student),
                )
                .route(
                    "/students/{id}",
                    get(students::get_student)
                        .put(students::update_student)
                        .delete(students::delete_student),
                )
                .route(
                    "/students/{id}/courses",
                    get(students::get_student_courses).post(students::enroll_student),
                )
                .route("/courses/{id}/students", get(students::get_course_students)),
            ServiceKind::Courses => Router::new()
                .route(
                    "/courses",
                    get(courses::list_courses).post(courses::create_course),
                )
                .route(
                    "/courses/{id}",
                    get(courses::get_course)
                        .put(courses::update_course)
                        .delete(courses::delete_course),
                )
                .route("/courses/{id}/students", get(courses::get_course_students)),
            ServiceKind::Accounts => Router::new()
                .route("/accounts", axum::routing::post(accounts::create_account))
                .route(
                    "/accounts/{username}",
                    get(accounts::get_account).put(accounts::update_account),
                ),
        };

        routes
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the TCP listener and returns the actual port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(
            service = self.state.service.service_name(),
            "listening on {}:{}", self.config.host, port
        );

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Fails if `start()` was not called, or on a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let controller = Arc::clone(&self.state.shutdown);
        let drain_timeout = self.config.drain_timeout;

        controller.set_ready();

        let on_signal = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                on_signal.trigger_shutdown();
            })
            .await?;

        if controller.wait_for_drain(drain_timeout).await {
            info!("all requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}
