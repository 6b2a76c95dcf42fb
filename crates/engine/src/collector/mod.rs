//! Per-tenant task metrics collection from the orchestrator
//!
//! Lists a tenant's running tasks and attaches a normalized stat block to
//! each. Containers on nodes this process cannot poll get a zeroed block
//! carrying the service memory limit; that is a topology fact, not a fault.

mod normalizer;
mod samples;


pub use normalizer::{cpu_percent, memory_percent, network_totals, normalize};
pub use samples::SampleCache;

use crate::models::{ContainerStats, TaskMetricRecord, NO_CONTAINER};
use crate::observability::EngineMetrics;
use crate::orchestrator::{
    short_id, Orchestrator, Reachability, ServiceNaming, ServiceSpec, TaskDescriptor,
};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for the task collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum tasks polled concurrently for one tenant
    pub max_concurrent_polls: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_polls: 4,
        }
    }
}

/// Collects per-task metrics for one tenant at a time
pub struct TaskMetricsCollector {
    orchestrator: Arc<dyn Orchestrator>,
    naming: ServiceNaming,
    samples: Arc<SampleCache>,
    config: CollectorConfig,
    metrics: EngineMetrics,
}

impl TaskMetricsCollector {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        naming: ServiceNaming,
        samples: Arc<SampleCache>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            orchestrator,
            naming,
            samples,
            config,
            metrics: EngineMetrics::new(),
        }
    }

    /// Task records for `tenant_id`; never empty, never an error
    pub async fn collect(&self, tenant_id: &str) -> Vec<TaskMetricRecord> {
        let service_name = self.naming.service_name(tenant_id);

        let service = match self.orchestrator.inspect_service(&service_name).await {
            Ok(Some(service)) => service,
            Ok(None) => return vec![TaskMetricRecord::not_found(&service_name)],
            Err(e) => {
                warn!(service = %service_name, error = %e, "Failed to inspect service");
                return vec![TaskMetricRecord::error(&service_name, e.to_string())];
            }
        };

        let tasks = match self.orchestrator.list_running_tasks(&service_name).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(service = %service_name, error = %e, "Failed to list tasks");
                return vec![TaskMetricRecord::error(&service_name, e.to_string())];
            }
        };

        if tasks.is_empty() {
            return vec![TaskMetricRecord::no_tasks(&service_name, service.memory_limit)];
        }

        let service = &service;
        let records = stream::iter(tasks)
            .map(|task| self.collect_task(service, task))
            .buffered(self.config.max_concurrent_polls.max(1))
            .collect::<Vec<_>>()
            .await;

        self.metrics.set_sample_cache_entries(self.samples.len() as i64);
        records
    }

    async fn collect_task(&self, service: &ServiceSpec, task: TaskDescriptor) -> TaskMetricRecord {
        let mut record = TaskMetricRecord {
            task_id: Some(task.id.clone()),
            node_id: Some(task.node_id.clone()),
            container_id: task
                .container_id
                .clone()
                .unwrap_or_else(|| NO_CONTAINER.to_string()),
            container_name: display_name(service, &task),
            status: task.state,
            error: task.error.clone(),
            reachable: None,
            stats: Some(ContainerStats::zeroed(service.memory_limit)),
        };

        // No container yet (pending/assigned): nothing to poll
        let Some(container_id) = task.container_id.as_deref() else {
            return record;
        };

        match self.orchestrator.probe_container(container_id).await {
            Ok(Reachability::Local) => {
                record.reachable = Some(true);
                match self.poll(container_id).await {
                    Ok(stats) => record.stats = Some(stats),
                    Err(message) => record.error = Some(message),
                }
            }
            Ok(Reachability::Remote) => {
                debug!(
                    container_id = %container_id,
                    node_id = %task.node_id,
                    "Container on remote node, reporting zeroed stats"
                );
                self.metrics.inc_remote_tasks();
                record.reachable = Some(false);
            }
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "Container probe failed");
                record.error = Some(e.to_string());
            }
        }

        record
    }

    /// Snapshot and normalize a local container, remembering the sample
    async fn poll(&self, container_id: &str) -> Result<ContainerStats, String> {
        let sample = self
            .orchestrator
            .container_snapshot(container_id)
            .await
            .map_err(|e| {
                warn!(container_id = %container_id, error = %e, "Container snapshot failed");
                e.to_string()
            })?;

        let previous = self.samples.get(container_id).or(sample.previous);
        let stats = normalize(previous.as_ref(), &sample.current);
        self.samples.insert(container_id, sample.current);

        Ok(stats)
    }
}

/// `<service>.<slot> (<node>)`, node id truncated
fn display_name(service: &ServiceSpec, task: &TaskDescriptor) -> String {
    let replica = match task.slot {
        Some(slot) => slot.to_string(),
        None => short_id(&task.id).to_string(),
    };

    if task.node_id.is_empty() {
        format!("{}.{} (unassigned)", service.name, replica)
    } else {
        format!("{}.{} ({})", service.name, replica, short_id(&task.node_id))
    }
}
