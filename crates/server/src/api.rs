//! HTTP API: tenant metrics, monitoring views, health and self-metrics

use crate::config::AggregatorConfig;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use metrics_engine::{
    health::{components, HealthProber, HealthRegistry},
    models::{ApiResponse, BackendHealth, HistoryRange},
    orchestrator::{Orchestrator, ServiceNaming},
    timeseries::TimeSeriesBackend,
    ClusterAggregator, HistoricalSeriesBuilder, OrchestratorError, SampleCache,
    TaskMetricsCollector, TenantMetricsSynthesizer,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_LOG_LINES: usize = 100;
pub const MAX_LOG_LINES: usize = 5000;

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    orchestrator: Arc<dyn Orchestrator>,
    naming: ServiceNaming,
    collector: TaskMetricsCollector,
    synthesizer: TenantMetricsSynthesizer,
    history: HistoricalSeriesBuilder,
    cluster: ClusterAggregator,
    prober: HealthProber,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        backend: Arc<dyn TimeSeriesBackend>,
        health_registry: HealthRegistry,
        config: &AggregatorConfig,
    ) -> Self {
        let naming = config.naming();
        let samples = Arc::new(SampleCache::new(
            config.sample_cache_capacity,
            config.sample_cache_ttl(),
        ));

        Self {
            collector: TaskMetricsCollector::new(
                orchestrator.clone(),
                naming.clone(),
                samples,
                config.collector(),
            ),
            synthesizer: TenantMetricsSynthesizer::new(
                backend.clone(),
                naming.clone(),
                config.synthesizer(),
            ),
            history: HistoricalSeriesBuilder::new(backend.clone(), naming.clone()),
            cluster: ClusterAggregator::new(backend.clone(), &naming),
            prober: HealthProber::new(backend, health_registry.clone()),
            health_registry,
            orchestrator,
            naming,
        }
    }

    /// Ping the orchestrator and probe the backend, recording both
    pub async fn refresh_health(&self) {
        match self.orchestrator.ping().await {
            Ok(()) => self.health_registry.set_healthy(components::ORCHESTRATOR).await,
            Err(e) => {
                self.health_registry
                    .set_degraded(components::ORCHESTRATOR, e.to_string())
                    .await
            }
        }
        self.prober.is_healthy().await;
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

fn validate_tenant(tenant_id: &str) -> Result<(), Response> {
    if ServiceNaming::is_valid_tenant_id(tenant_id) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "invalid tenant id: expected 1-{} characters from [A-Za-z0-9_-]",
                ServiceNaming::MAX_TENANT_ID_LEN
            ),
        ))
    }
}

/// Per-task container metrics
async fn tenant_metrics(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Response {
    if let Err(rejection) = validate_tenant(&tenant_id) {
        return rejection;
    }
    ok(state.collector.collect(&tenant_id).await)
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    lines: Option<String>,
}

/// `lines` defaults to 100 and is clamped to `1..=5000`
fn parse_lines(raw: Option<&str>) -> Result<usize, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_LOG_LINES),
        Some(value) => value
            .parse::<usize>()
            .map(|n| n.clamp(1, MAX_LOG_LINES))
            .map_err(|_| format!("lines must be a positive integer, got '{}'", value)),
    }
}

async fn tenant_logs(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    if let Err(rejection) = validate_tenant(&tenant_id) {
        return rejection;
    }
    let lines = match parse_lines(query.lines.as_deref()) {
        Ok(lines) => lines,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let service_name = state.naming.service_name(&tenant_id);
    match state.orchestrator.service_logs(&service_name, lines).await {
        Ok(lines) => ok(lines),
        Err(OrchestratorError::NotFound(_)) => error_response(
            StatusCode::NOT_FOUND,
            format!("service {} not found", service_name),
        ),
        Err(e) => {
            warn!(tenant_id = %tenant_id, error = %e, "Failed to fetch service logs");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn tenant_snapshot(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Response {
    if let Err(rejection) = validate_tenant(&tenant_id) {
        return rejection;
    }
    ok(state.synthesizer.synthesize(&tenant_id).await)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    range: Option<String>,
}

async fn tenant_history(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if let Err(rejection) = validate_tenant(&tenant_id) {
        return rejection;
    }

    let range = match query.range.as_deref() {
        None | Some("") => HistoryRange::default(),
        Some(raw) => match raw.parse::<HistoryRange>() {
            Ok(range) => range,
            Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
        },
    };

    ok(state.history.history(&tenant_id, range).await)
}

async fn cluster_overview(State(state): State<Arc<AppState>>) -> Response {
    ok(state.cluster.overview().await)
}

async fn backend_health(State(state): State<Arc<AppState>>) -> Response {
    let healthy = state.prober.is_healthy().await;
    ok(BackendHealth {
        healthy,
        timestamp: Utc::now(),
    })
}

/// Always 200: degraded collaborators show up in the body only
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_health().await;
    (StatusCode::OK, Json(state.health_registry.health().await))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus exposition of the aggregator's own metrics
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tenants/:id/metrics", get(tenant_metrics))
        .route("/tenants/:id/logs", get(tenant_logs))
        .route("/monitoring/cluster/overview", get(cluster_overview))
        .route("/monitoring/prometheus/health", get(backend_health))
        .route("/monitoring/:id/prometheus", get(tenant_snapshot))
        .route("/monitoring/:id/prometheus/history", get(tenant_history))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
