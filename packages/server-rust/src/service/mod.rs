//! Operation routing and execution framework.
//!
//! 1. **Operations** (`operation`): typed requests, responses and the error taxonomy
//! 2. **Middleware** (`middleware`): Tower layers (rate limit, circuit breaker, logging, metrics)
//! 3. **Routing** (`router`): dispatch by method tag to per-endpoint pipelines
//! 4. **Domain services** (`domain`): students, courses and accounts
//! 5. **Fan-out** (`fanout`): concurrent resolution of related remote entities

pub mod config;
pub mod domain;
pub mod factory;
pub mod fanout;
pub mod middleware;
pub mod operation;
pub mod router;

pub use config::{ConfigError, ServerConfig, ServiceKind};
pub use factory::OperationFactory;
pub use fanout::resolve_many;
pub use operation::{
    methods, service_names, Operation, OperationContext, OperationError, OperationResponse,
};
pub use router::OperationRouter;
