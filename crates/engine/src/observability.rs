//! Observability infrastructure for the metrics engine
//!
//! Provides:
//! - Prometheus metrics about the engine itself (backend latency, failures,
//!   degraded views, remote tasks, sample cache size)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for backend round trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    query_latency_seconds: HistogramVec,
    query_failures: IntCounterVec,
    degraded_views: IntCounterVec,
    orchestrator_failures: IntCounter,
    remote_tasks: IntCounter,
    sample_cache_entries: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram_vec!(
                "wp_metrics_backend_query_latency_seconds",
                "Round-trip time of time-series backend queries",
                &["kind"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register backend_query_latency_seconds"),

            query_failures: register_int_counter_vec!(
                "wp_metrics_backend_query_failures_total",
                "Time-series queries that failed (transport, timeout, backend error)",
                &["kind"]
            )
            .expect("Failed to register backend_query_failures_total"),

            degraded_views: register_int_counter_vec!(
                "wp_metrics_degraded_views_total",
                "Assembled views answered with zeroed or empty data",
                &["view"]
            )
            .expect("Failed to register degraded_views_total"),

            orchestrator_failures: register_int_counter!(
                "wp_metrics_orchestrator_failures_total",
                "Orchestrator requests that failed"
            )
            .expect("Failed to register orchestrator_failures_total"),

            remote_tasks: register_int_counter!(
                "wp_metrics_remote_tasks_total",
                "Tasks reported with zeroed stats because their node is not reachable"
            )
            .expect("Failed to register remote_tasks_total"),

            sample_cache_entries: register_int_gauge!(
                "wp_metrics_sample_cache_entries",
                "Previous container samples currently retained"
            )
            .expect("Failed to register sample_cache_entries"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    /// `kind` is `instant` or `range`
    pub fn observe_query_latency(&self, kind: &str, duration_secs: f64) {
        self.inner()
            .query_latency_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    pub fn inc_query_failures(&self, kind: &str) {
        self.inner().query_failures.with_label_values(&[kind]).inc();
    }

    /// `view` is `tenant`, `history` or `cluster`
    pub fn inc_degraded_view(&self, view: &str) {
        self.inner().degraded_views.with_label_values(&[view]).inc();
    }

    pub fn inc_orchestrator_failures(&self) {
        self.inner().orchestrator_failures.inc();
    }

    pub fn inc_remote_tasks(&self) {
        self.inner().remote_tasks.inc();
    }

    pub fn set_sample_cache_entries(&self, entries: i64) {
        self.inner().sample_cache_entries.set(entries);
    }
}

/// Structured logger for service lifecycle and degradation events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

/// Instance named after `HOSTNAME`, which Swarm sets to the container id
impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(std::env::var("HOSTNAME").unwrap_or_else(|_| "metrics-aggregator".to_string()))
    }
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, docker_url: &str, prometheus_url: &str) {
        info!(
            event = "aggregator_started",
            instance = %self.instance,
            version = %version,
            docker_url = %docker_url,
            prometheus_url = %prometheus_url,
            "Metrics aggregator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "aggregator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Metrics aggregator shutting down"
        );
    }

    /// A view was answered with zeroed/empty data instead of an error
    pub fn log_degraded_view(&self, view: &str, tenant_id: Option<&str>, reason: &str) {
        warn!(
            event = "view_degraded",
            instance = %self.instance,
            view = %view,
            tenant_id = ?tenant_id,
            reason = %reason,
            "Serving degraded metrics view"
        );
    }

    pub fn log_backend_status(&self, backend: &str, reachable: bool) {
        if reachable {
            info!(
                event = "backend_status",
                instance = %self.instance,
                backend = %backend,
                reachable = true,
                "Backend reachable"
            );
        } else {
            warn!(
                event = "backend_status",
                instance = %self.instance,
                backend = %backend,
                reachable = false,
                "Backend unreachable, views will degrade"
            );
        }
    }
}
