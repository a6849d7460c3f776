//! Builds the `OperationContext` for each inbound call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::config::ServerConfig;
use super::operation::OperationContext;

/// Hands out contexts with unique call ids and the configured deadline.
#[derive(Debug)]
pub struct OperationFactory {
    config: Arc<ServerConfig>,
    call_id_counter: AtomicU64,
}

impl OperationFactory {
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            call_id_counter: AtomicU64::new(1),
        }
    }

    fn next_call_id(&self) -> u64 {
        self.call_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Context for one call to `method`, deadline counted from now.
    #[must_use]
    pub fn make_ctx(&self, method: &'static str, request_id: Option<String>) -> OperationContext {
        let mut ctx = OperationContext::new(
            self.next_call_id(),
            self.config.service.service_name(),
            method,
            self.config.operation_timeout(),
        );
        ctx.request_id = request_id;
        ctx
    }
}
