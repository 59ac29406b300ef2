//! Hegel - instance metadata service
//!
//! This binary serves machine metadata fetched from the hardware inventory.

use anyhow::{Context, Result};
use clap::Parser;
use hegel::{AppState, AvailabilityTracker, GIT_REV, HegelMetrics, ServerConfig, router, serve};
use hegel_client::{GrpcHardwareClient, HardwareClient};
use hegel_common::config::DEFAULT_CUSTOM_ENDPOINTS;
use hegel_common::{CustomEndpoints, DataModel, TrustedProxies};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hegel")]
#[command(about = "Hegel instance metadata service")]
#[command(version)]
struct Args {
    /// Port to serve metadata on
    #[arg(long, env = "HEGEL_HTTP_PORT", default_value_t = 50061)]
    http_port: u16,

    /// JSON object mapping extra HTTP paths to filter expressions
    #[arg(long, env = "CUSTOM_ENDPOINTS", default_value = DEFAULT_CUSTOM_ENDPOINTS)]
    custom_endpoints: String,

    /// Response model for custom endpoints: empty for legacy export, "1" for filtered
    #[arg(long, env = "DATA_MODEL_VERSION", default_value = "")]
    data_model_version: String,

    /// Comma-separated CIDRs whose X-Forwarded-For headers are trusted
    #[arg(long, env = "TRUSTED_PROXIES", default_value = "")]
    trusted_proxies: String,

    /// Hardware inventory endpoint
    #[arg(long, env = "HEGEL_HARDWARE_ENDPOINT", default_value = "http://localhost:42111")]
    hardware_endpoint: String,

    /// Timeout for each hardware inventory call, in seconds
    #[arg(long, env = "HEGEL_BACKEND_TIMEOUT_SECS", default_value_t = 5)]
    backend_timeout_secs: u64,

    /// Interval between hardware inventory health checks, in seconds
    #[arg(long, env = "HEGEL_HEALTH_INTERVAL_SECS", default_value_t = 15)]
    health_interval_secs: u64,

    /// Log level
    #[arg(long, env = "HEGEL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hegel (git rev {GIT_REV})");

    let data_model: DataModel = args.data_model_version.parse()?;
    let custom_endpoints: CustomEndpoints = args.custom_endpoints.parse()?;
    let trusted_proxies: TrustedProxies = args.trusted_proxies.parse()?;
    let backend_timeout = Duration::from_secs(args.backend_timeout_secs);
    anyhow::ensure!(
        args.health_interval_secs > 0,
        "health check interval must be at least one second"
    );
    info!("Data model: {data_model}");
    info!("Custom endpoints: {}", custom_endpoints.len());
    info!("Hardware endpoint: {}", args.hardware_endpoint);

    // The channel connects on first use so startup does not wait on the backend
    let client: Arc<dyn HardwareClient> = Arc::new(
        GrpcHardwareClient::connect_lazy(&args.hardware_endpoint, backend_timeout)
            .context("Failed to set up hardware client")?,
    );

    let metrics = Arc::new(HegelMetrics::new());
    let health = Arc::new(AvailabilityTracker::new(
        Arc::clone(&client),
        Arc::clone(&metrics),
        backend_timeout,
    ));

    let state = Arc::new(AppState::new(
        client,
        Arc::clone(&health),
        metrics,
        ServerConfig {
            custom_endpoints,
            data_model,
            trusted_proxies,
            backend_timeout,
            git_rev: GIT_REV.to_string(),
        },
    )?);

    // Background health prober
    let prober = tokio::spawn(health.run(Duration::from_secs(args.health_interval_secs)));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let result = serve(listener, router(state)).await;
    prober.abort();
    result?;

    info!("Hegel shut down gracefully");

    Ok(())
}
