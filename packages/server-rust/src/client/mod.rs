//! Outbound calls to sibling services.
//!
//! - [`path`]: URL templating with per-call copies of the base URL
//! - [`transport`]: the `reqwest` exchange and its error mapping
//! - [`remote`]: typed clients wrapping the transport in limiter and breaker

pub mod path;
pub mod remote;
pub mod transport;

pub use path::{normalize_base, PathTemplate};
pub use remote::{
    CourseClient, CourseStudentsClient, RemoteClient, RemoteEndpoint, GET_COURSE,
    GET_COURSE_STUDENTS,
};
pub use transport::{build_http_client, HttpTransport, RemoteRequest};
