use std::time::Duration;

/// Which of the three record services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    Students,
    Courses,
    Accounts,
}

impl ServiceKind {
    /// Whether this service calls a sibling and therefore needs a peer URL.
    #[must_use]
    pub fn needs_peer(self) -> bool {
        matches!(self, Self::Students | Self::Courses)
    }

    #[must_use]
    pub fn service_name(self) -> &'static str {
        use crate::service::operation::service_names;
        match self {
            Self::Students => service_names::STUDENTS,
            Self::Courses => service_names::COURSES,
            Self::Accounts => service_names::ACCOUNTS,
        }
    }
}

/// Token-bucket settings for one limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per second. Refill is continuous.
    pub refill_per_sec: f64,
    /// Bucket capacity. Zero rejects every call.
    pub burst: u32,
}

/// Settings for one circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker. Values below 1 act as 1.
    pub failure_threshold: u32,
    /// Time spent `Open` before a probe is allowed.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Settings for outbound clients to sibling services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteClientConfig {
    pub rate_limit: RateLimitConfig,
    pub breaker: CircuitBreakerConfig,
    /// TCP connect timeout; the request deadline comes from the caller.
    pub connect_timeout: Duration,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                refill_per_sec: 1.0,
                burst: 100,
            },
            breaker: CircuitBreakerConfig::default(),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Bounds on a single fan-out job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    /// Maximum related ids resolved at once. `0` means unbounded.
    pub max_concurrency: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self { max_concurrency: 16 }
    }
}

/// Process-level configuration for the operation pipeline.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceKind,
    /// Default deadline for each inbound operation, in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Limiter applied to every inbound endpoint (each gets its own bucket).
    pub endpoint_rate_limit: RateLimitConfig,
    /// Breaker applied to every inbound endpoint (each gets its own state).
    pub endpoint_breaker: CircuitBreakerConfig,
    pub remote: RemoteClientConfig,
    pub fan_out: FanOutConfig,
    /// Base URL of the sibling service (courses for students, and back).
    pub peer_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceKind::Students,
            default_operation_timeout_ms: 30_000,
            endpoint_rate_limit: RateLimitConfig {
                refill_per_sec: 1.0,
                burst: 1,
            },
            endpoint_breaker: CircuitBreakerConfig::default(),
            remote: RemoteClientConfig::default(),
            fan_out: FanOutConfig::default(),
            peer_url: None,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("refill rate for {limiter} must be finite and non-negative, got {value}")]
    InvalidRefill { limiter: &'static str, value: f64 },
    #[error("the {service:?} service needs a peer URL")]
    MissingPeer { service: ServiceKind },
    #[error("operation timeout must be positive")]
    ZeroTimeout,
}

impl ServerConfig {
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.default_operation_timeout_ms)
    }

    /// Checks the values clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (limiter, rl) in [
            ("endpoints", self.endpoint_rate_limit),
            ("remote client", self.remote.rate_limit),
        ] {
            if !rl.refill_per_sec.is_finite() || rl.refill_per_sec < 0.0 {
                return Err(ConfigError::InvalidRefill {
                    limiter,
                    value: rl.refill_per_sec,
                });
            }
        }
        if self.default_operation_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.service.needs_peer() && self.peer_url.is_none() {
            return Err(ConfigError::MissingPeer {
                service: self.service,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_deployed_values() {
        let config = ServerConfig::default();
        assert_eq!(config.default_operation_timeout_ms, 30_000);
        assert_eq!(config.endpoint_rate_limit.burst, 1);
        assert!((config.endpoint_rate_limit.refill_per_sec - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.remote.rate_limit.burst, 100);
        assert_eq!(config.endpoint_breaker.failure_threshold, 5);
        assert_eq!(config.endpoint_breaker.cool_down, Duration::from_secs(60));
        assert_eq!(config.fan_out.max_concurrency, 16);
    }

    #[test]
    fn peer_is_required_for_students_and_courses() {
        let config = ServerConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPeer {
                service: ServiceKind::Students
            })
        );

        let accounts = ServerConfig {
            service: ServiceKind::Accounts,
            ..ServerConfig::default()
        };
        assert!(accounts.validate().is_ok());
    }

    #[test]
    fn negative_refill_is_rejected() {
        let mut config = ServerConfig {
            service: ServiceKind::Accounts,
            ..ServerConfig::default()
        };
        config.remote.rate_limit.refill_per_sec = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRefill {
                limiter: "remote client",
                ..
            })
        ));
    }
}
