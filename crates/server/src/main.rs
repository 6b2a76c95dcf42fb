//! Metrics aggregator for the WordPress hosting cluster
//!
//! Serves per-tenant container metrics, time-series rollups and a cluster
//! overview. Runs on a Swarm manager next to a Docker socket proxy.

use anyhow::{Context, Result};
use metrics_aggregator::{api, config::AggregatorConfig};
use metrics_engine::{
    health::{components, ComponentStatus, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    orchestrator::{DockerClient, Orchestrator},
    timeseries::{PrometheusClient, TimeSeriesBackend},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGGREGATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metrics-aggregator");

    let config = AggregatorConfig::load()?;
    info!(
        docker_url = %config.docker_url,
        prometheus_url = %config.prometheus_url,
        service_prefix = %config.service_prefix,
        "Aggregator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ORCHESTRATOR).await;
    health_registry.register(components::TIME_SERIES).await;

    // Register self-metrics before the first scrape
    let _metrics = EngineMetrics::new();

    let logger = StructuredLogger::default();
    logger.log_startup(AGGREGATOR_VERSION, &config.docker_url, &config.prometheus_url);

    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(DockerClient::new(config.docker()).context("failed to build Docker client")?);
    let backend: Arc<dyn TimeSeriesBackend> = Arc::new(
        PrometheusClient::new(config.prometheus()).context("failed to build Prometheus client")?,
    );

    let app_state = Arc::new(api::AppState::new(
        orchestrator,
        backend,
        health_registry.clone(),
        &config,
    ));

    // Unreachable backends degrade views; they do not block startup
    app_state.refresh_health().await;
    let health = health_registry.health().await;
    for (name, component) in &health.components {
        logger.log_backend_status(name, component.status == ComponentStatus::Healthy);
    }

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.listen_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
