//! Runs one LMS service (students, courses or accounts) over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lms_server::network::{AppState, NetworkConfig, NetworkModule, ShutdownController};
use lms_server::service::config::{
    CircuitBreakerConfig, FanOutConfig, RateLimitConfig, RemoteClientConfig,
};
use lms_server::service::domain::build_operation_router;
use lms_server::service::middleware::metrics::init_prometheus;
use lms_server::service::middleware::{MetricsSink, PrometheusSink};
use lms_server::service::{OperationFactory, ServerConfig, ServiceKind};
use lms_server::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lms-server", version, about)]
struct Args {
    /// Which service to run.
    #[arg(long, env = "LMS_SERVICE", value_enum)]
    service: ServiceKind,

    #[arg(long, env = "LMS_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "LMS_PORT", default_value_t = 8080)]
    port: u16,

    /// Base URL of the sibling service (courses for students, students for courses).
    #[arg(long, env = "LMS_PEER_URL")]
    peer_url: Option<String>,

    /// Prometheus scrape address, e.g. 0.0.0.0:9090.
    #[arg(long, env = "LMS_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "LMS_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    #[arg(long, env = "LMS_ENDPOINT_RPS", default_value_t = 1.0)]
    endpoint_rps: f64,

    #[arg(long, env = "LMS_ENDPOINT_BURST", default_value_t = 1)]
    endpoint_burst: u32,

    #[arg(long, env = "LMS_REMOTE_RPS", default_value_t = 1.0)]
    remote_rps: f64,

    #[arg(long, env = "LMS_REMOTE_BURST", default_value_t = 100)]
    remote_burst: u32,

    /// Consecutive failures that open a breaker.
    #[arg(long, env = "LMS_BREAKER_THRESHOLD", default_value_t = 5)]
    breaker_threshold: u32,

    #[arg(long, env = "LMS_BREAKER_COOL_DOWN_SECS", default_value_t = 60)]
    breaker_cool_down_secs: u64,

    /// Related ids resolved at once by fan-out views; 0 is unbounded.
    #[arg(long, env = "LMS_FAN_OUT_CONCURRENCY", default_value_t = 16)]
    fan_out_concurrency: usize,

    #[arg(long, env = "LMS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let breaker = CircuitBreakerConfig {
            failure_threshold: self.breaker_threshold,
            cool_down: Duration::from_secs(self.breaker_cool_down_secs),
        };
        ServerConfig {
            service: self.service,
            default_operation_timeout_ms: self.operation_timeout_ms,
            endpoint_rate_limit: RateLimitConfig {
                refill_per_sec: self.endpoint_rps,
                burst: self.endpoint_burst,
            },
            endpoint_breaker: breaker,
            remote: RemoteClientConfig {
                rate_limit: RateLimitConfig {
                    refill_per_sec: self.remote_rps,
                    burst: self.remote_burst,
                },
                breaker,
                ..RemoteClientConfig::default()
            },
            fan_out: FanOutConfig {
                max_concurrency: self.fan_out_concurrency,
            },
            peer_url: self.peer_url.clone(),
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            metrics_address: self.metrics_addr,
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lms_server=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.server_config();
    config.validate()?;
    let network = args.network_config();

    if let Some(addr) = network.metrics_address {
        init_prometheus(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    let sink: Arc<dyn MetricsSink> = Arc::new(PrometheusSink::new(config.service.service_name()));
    let router = build_operation_router(&config, Arc::new(MemoryStore::new()), sink)?;
    info!(
        service = config.service.service_name(),
        peer = config.peer_url.as_deref().unwrap_or("-"),
        endpoints = router.methods().len(),
        "operation router ready"
    );

    let state = AppState {
        service: config.service,
        router,
        factory: Arc::new(OperationFactory::new(Arc::new(config))),
        shutdown: Arc::new(ShutdownController::new()),
        start_time: Instant::now(),
    };

    let mut module = NetworkModule::new(network, state);
    module.start().await?;
    module.serve(shutdown_signal()).await
}
