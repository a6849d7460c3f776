//! Network configuration types for the LMS services.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level network configuration for one service process.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Outer HTTP deadline, enforced by `tower_http::timeout`.
    ///
    /// Operation deadlines are shorter and live in `ServerConfig`.
    pub request_timeout: Duration,
    /// How long `serve()` waits for in-flight requests after shutdown.
    pub drain_timeout: Duration,
    /// Prometheus scrape address; `None` disables the exporter.
    pub metrics_address: Option<SocketAddr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert!(config.metrics_address.is_none());
    }
}
