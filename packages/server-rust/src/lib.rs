//! LMS Server: students, courses and accounts services behind a resilient
//! operation pipeline, with remote clients and fan-out aggregation.

pub mod client;
pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

pub use service::{Operation, OperationError, OperationResponse, ServerConfig, ServiceKind};
pub use storage::MemoryStore;
pub use traits::{AccountQuerier, CourseQuerier, StudentQuerier};
