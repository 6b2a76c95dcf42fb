//! Tenant resource rollup from the time-series backend
//!
//! Nine instant queries over cAdvisor series scoped to the tenant's
//! service. The snapshot is all-or-nothing: if any query fails the caller
//! gets a zeroed snapshot, never a mix of real and missing figures.

use crate::error::QueryResult;
use crate::models::{
    round2, CpuUsage, MemoryUsage, NetworkUsage, StorageUsage, TenantMetrics,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::orchestrator::ServiceNaming;
use crate::timeseries::{PromQuery, QueryData, Selector, TimeSeriesBackend};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Lookback window for every `rate()` query
pub const RATE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Per-container memory assumed when estimating the tenant limit
    pub assumed_container_memory_bytes: u64,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            assumed_container_memory_bytes: 512 * 1024 * 1024,
        }
    }
}

/// The nine queries behind one tenant snapshot
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TenantQueries {
    pub cpu_by_container: PromQuery,
    pub memory: PromQuery,
    pub rx_total: PromQuery,
    pub tx_total: PromQuery,
    pub rx_rate: PromQuery,
    pub tx_rate: PromQuery,
    pub container_count: PromQuery,
    pub fs_usage: PromQuery,
    pub fs_limit: PromQuery,
}

impl TenantQueries {
    pub fn for_service(label: &str, service_name: &str) -> Self {
        let scope = Selector::new("container_cpu_usage_seconds_total").eq(label, service_name);
        let metric = |name: &str| scope.with_metric(name);

        Self {
            cpu_by_container: PromQuery::rate(&scope, RATE_WINDOW)
                .sum_by(&["name"])
                .scale(100.0),
            memory: PromQuery::select(&metric("container_memory_usage_bytes")).sum(),
            rx_total: PromQuery::select(&metric("container_network_receive_bytes_total")).sum(),
            tx_total: PromQuery::select(&metric("container_network_transmit_bytes_total")).sum(),
            rx_rate: PromQuery::rate(&metric("container_network_receive_bytes_total"), RATE_WINDOW)
                .sum(),
            tx_rate: PromQuery::rate(&metric("container_network_transmit_bytes_total"), RATE_WINDOW)
                .sum(),
            container_count: PromQuery::select(&metric("container_last_seen")).count(),
            fs_usage: PromQuery::select(&metric("container_fs_usage_bytes")).sum(),
            fs_limit: PromQuery::select(&metric("container_fs_limit_bytes")).sum(),
        }
    }
}

/// Builds `TenantMetrics` for one tenant
pub struct TenantMetricsSynthesizer {
    backend: Arc<dyn TimeSeriesBackend>,
    naming: ServiceNaming,
    config: SynthesizerConfig,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl TenantMetricsSynthesizer {
    pub fn new(
        backend: Arc<dyn TimeSeriesBackend>,
        naming: ServiceNaming,
        config: SynthesizerConfig,
    ) -> Self {
        Self {
            backend,
            naming,
            config,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::default(),
        }
    }

    /// Current rollup for `tenant_id`; zeroed when the backend fails
    pub async fn synthesize(&self, tenant_id: &str) -> TenantMetrics {
        let service_name = self.naming.service_name(tenant_id);

        match self.try_synthesize(&service_name).await {
            Ok(metrics) => metrics,
            Err(e) => {
                self.logger
                    .log_degraded_view("tenant", Some(tenant_id), &e.to_string());
                self.metrics.inc_degraded_view("tenant");
                TenantMetrics::zeroed(Utc::now())
            }
        }
    }

    async fn try_synthesize(&self, service_name: &str) -> QueryResult<TenantMetrics> {
        let q = TenantQueries::for_service(self.naming.label(), service_name);
        let backend = self.backend.as_ref();

        let (cpu, memory, rx_total, tx_total, rx_rate, tx_rate, count, fs_usage, fs_limit) = tokio::try_join!(
            backend.instant(&q.cpu_by_container),
            backend.instant(&q.memory),
            backend.instant(&q.rx_total),
            backend.instant(&q.tx_total),
            backend.instant(&q.rx_rate),
            backend.instant(&q.tx_rate),
            backend.instant(&q.container_count),
            backend.instant(&q.fs_usage),
            backend.instant(&q.fs_limit),
        )?;

        let container_count = non_negative(count.value_or_zero()).round() as u64;
        let memory_current = non_negative(memory.value_or_zero());
        let memory_limit =
            container_count as f64 * self.config.assumed_container_memory_bytes as f64;
        let storage_used = non_negative(fs_usage.value_or_zero());
        let storage_total = non_negative(fs_limit.value_or_zero());

        Ok(TenantMetrics {
            cpu: cpu_usage(&cpu),
            memory: MemoryUsage {
                current: memory_current,
                limit: memory_limit,
                percent: percent_of(memory_current, memory_limit),
                limit_estimated: container_count > 0,
            },
            network: NetworkUsage {
                rx_bytes: non_negative(rx_total.value_or_zero()),
                tx_bytes: non_negative(tx_total.value_or_zero()),
                rx_rate: non_negative(rx_rate.value_or_zero()),
                tx_rate: non_negative(tx_rate.value_or_zero()),
            },
            storage: StorageUsage {
                used: storage_used,
                total: storage_total,
                percent: percent_of(storage_used, storage_total),
            },
            container_count,
            timestamp: Utc::now(),
        })
    }
}

/// current = sum, avg = mean, max = max over per-container CPU percentages
fn cpu_usage(per_container: &QueryData) -> CpuUsage {
    let values: Vec<f64> = per_container.values().into_iter().map(non_negative).collect();
    if values.is_empty() {
        return CpuUsage::default();
    }

    let sum: f64 = values.iter().sum();
    let max = values.iter().copied().fold(0.0, f64::max);

    CpuUsage {
        current: round2(sum),
        avg: round2(sum / values.len() as f64),
        max: round2(max),
    }
}

/// Not capped at 100: usage above an estimated limit is reported as is
fn percent_of(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round2((used / total * 100.0).max(0.0))
}

/// Counter resets can make rates dip below zero
fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
