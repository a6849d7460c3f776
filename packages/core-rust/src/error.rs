//! Error classification shared by every service and by the transport layer.
//!
//! [`ErrorKind`] is the stable, transport-independent classification of a
//! failure. Each kind maps to exactly one HTTP status so that the same failure
//! surfaces identically no matter which service produced it.

use serde::{Deserialize, Serialize};

/// Stable classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed identifier or request shape. Never retried.
    Validation,
    /// Rejected by a rate limiter. The caller may retry after backing off.
    Throttled,
    /// Dependency presumed unhealthy; the circuit is open.
    CircuitOpen,
    /// The deadline expired while talking to a sibling service.
    RemoteTimeout,
    /// Transport failure talking to a sibling service.
    RemoteUnavailable,
    /// The requested entity does not exist.
    NotFound,
    /// The caller cancelled the request.
    Cancelled,
    /// A pipeline or client was assembled incorrectly.
    Configuration,
    /// Any other failure (store errors, panics in workers).
    Internal,
}

impl ErrorKind {
    /// HTTP status code used at the transport boundary.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Throttled => 429,
            Self::RemoteUnavailable => 502,
            Self::CircuitOpen | Self::Cancelled => 503,
            Self::RemoteTimeout => 504,
            Self::Configuration | Self::Internal => 500,
        }
    }

    /// Short label used in metrics and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Throttled => "throttled",
            Self::CircuitOpen => "circuit_open",
            Self::RemoteTimeout => "remote_timeout",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

/// JSON body returned on every non-2xx response: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
