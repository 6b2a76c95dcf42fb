//! Cluster-wide overview
//!
//! Node-exporter, cAdvisor and reverse-proxy series rolled into one view.
//! All-or-nothing like the tenant snapshot.

use crate::error::QueryResult;
use crate::models::{round2, ClusterMetrics};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::orchestrator::ServiceNaming;
use crate::synthesizer::RATE_WINDOW;
use crate::timeseries::{PromQuery, Selector, TimeSeriesBackend};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClusterQueries {
    pub cpu: PromQuery,
    pub memory: PromQuery,
    pub containers: PromQuery,
    pub nodes: PromQuery,
    pub tenants: PromQuery,
    pub request_rate: PromQuery,
    pub avg_latency: PromQuery,
}

impl ClusterQueries {
    pub fn new(service_label: &str, service_prefix: &str) -> Self {
        let idle = Selector::new("node_cpu_seconds_total").eq("mode", "idle");
        let named = Selector::new("container_memory_usage_bytes").not_eq("name", "");
        let tenant_containers =
            Selector::new("container_last_seen").has_prefix(service_label, service_prefix);

        let latency_sum = Selector::new("traefik_service_request_duration_seconds_sum");
        let latency_count = Selector::new("traefik_service_request_duration_seconds_count");

        Self {
            cpu: PromQuery::rate(&idle, RATE_WINDOW)
                .avg()
                .one_minus()
                .scale(100.0),
            memory: PromQuery::select(&named).sum(),
            containers: PromQuery::select(&named.with_metric("container_last_seen")).count(),
            nodes: PromQuery::select(&Selector::new("node_uname_info")).count(),
            tenants: PromQuery::select(&tenant_containers)
                .count_by(&[service_label])
                .count(),
            request_rate: PromQuery::rate(
                &Selector::new("traefik_service_requests_total"),
                RATE_WINDOW,
            )
            .sum(),
            avg_latency: PromQuery::rate(&latency_sum, RATE_WINDOW)
                .sum()
                .div(PromQuery::rate(&latency_count, RATE_WINDOW).sum()),
        }
    }
}

pub struct ClusterAggregator {
    backend: Arc<dyn TimeSeriesBackend>,
    queries: ClusterQueries,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl ClusterAggregator {
    pub fn new(backend: Arc<dyn TimeSeriesBackend>, naming: &ServiceNaming) -> Self {
        Self {
            backend,
            queries: ClusterQueries::new(naming.label(), naming.prefix()),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::default(),
        }
    }

    /// Cluster rollup; all zero when any query fails
    pub async fn overview(&self) -> ClusterMetrics {
        match self.try_overview().await {
            Ok(metrics) => metrics,
            Err(e) => {
                self.logger.log_degraded_view("cluster", None, &e.to_string());
                self.metrics.inc_degraded_view("cluster");
                ClusterMetrics::default()
            }
        }
    }

    async fn try_overview(&self) -> QueryResult<ClusterMetrics> {
        let q = &self.queries;
        let backend = self.backend.as_ref();

        let (cpu, memory, containers, nodes, tenants, request_rate, latency) = tokio::try_join!(
            backend.instant(&q.cpu),
            backend.instant(&q.memory),
            backend.instant(&q.containers),
            backend.instant(&q.nodes),
            backend.instant(&q.tenants),
            backend.instant(&q.request_rate),
            backend.instant(&q.avg_latency),
        )?;

        Ok(ClusterMetrics {
            total_cpu: round2(cpu.value_or_zero().clamp(0.0, 100.0)),
            total_memory: memory.value_or_zero().max(0.0),
            total_containers: as_count(containers.value_or_zero()),
            node_count: as_count(nodes.value_or_zero()),
            tenant_count: as_count(tenants.value_or_zero()),
            requests_per_second: round2(request_rate.value_or_zero().max(0.0)),
            avg_latency: latency.value_or_zero().max(0.0),
            proxy_metrics_available: !request_rate.is_empty(),
        })
    }
}

fn as_count(value: f64) -> u64 {
    value.max(0.0).round() as u64
}
