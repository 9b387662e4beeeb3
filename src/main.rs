use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratekeeper::config::{LogFormat, LoggingConfig, RatekeeperConfig, StoreBackend};
use ratekeeper::grpc::{GrpcServer, RateLimitServiceImpl};
use ratekeeper::limiter::{LimiterOptions, RateLimiter};
use ratekeeper::store::{KeyValueStore, MemoryStore, RedisStore};

/// Per-client rate limiting service backed by a shared key-value store.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "RATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Override the Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RatekeeperConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    if let Some(url) = args.redis_url {
        config.store.redis_url = url;
    }

    init_tracing(&config.logging);

    info!("Starting Ratekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        grpc_addr = %config.server.grpc_addr,
        backend = ?config.store.backend,
        max_requests = config.limits.max_requests,
        window_seconds = config.limits.window_seconds,
        failure_policy = ?config.limits.failure_policy,
        "Configuration loaded"
    );

    // Opened here and dropped when the server stops
    let store: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(&config.store.redis_url, &config.store.key_prefix).await?,
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let rate_limiter = Arc::new(RateLimiter::new(
        store,
        LimiterOptions::from(&config.limits),
    ));
    info!("Rate limiter initialized");

    let service = RateLimitServiceImpl::new(
        rate_limiter,
        config.limits.quota()?,
        config.limits.failure_policy,
    );
    let grpc_server = GrpcServer::new(config.server.grpc_addr, service);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Ratekeeper Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
