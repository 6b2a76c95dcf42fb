//! Container orchestrator adapter
//!
//! Narrow view of the Swarm control API: service inspection, task listing,
//! container reachability, one-shot resource snapshots and service logs.
//! A missing service and a container on another node are data, not errors.

mod docker;
mod logs;

pub use docker::{DockerClient, DockerConfig};
pub use logs::demux_log_stream;

use crate::error::OrchestratorResult;
use crate::models::{ContainerResourceSnapshot, TaskState};
use async_trait::async_trait;

/// Service properties the collectors need
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSpec {
    pub id: String,
    pub name: String,
    /// `None` for global-mode services
    pub replicas: Option<u64>,
    /// Configured memory limit; 0 when unset
    pub memory_limit: u64,
}

/// One scheduled task of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: String,
    pub node_id: String,
    pub slot: Option<u64>,
    pub container_id: Option<String>,
    pub state: TaskState,
    pub error: Option<String>,
}

/// Whether this process can poll a container's stats directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Container runs on the node behind the orchestrator endpoint
    Local,
    /// Container exists elsewhere in the cluster
    Remote,
}

/// One stats read: the current snapshot plus the engine's own previous
/// sample when it supplied one
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSample {
    pub current: ContainerResourceSnapshot,
    pub previous: Option<ContainerResourceSnapshot>,
}

/// Read-only access to the container orchestrator
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// `Ok(None)` when the service does not exist
    async fn inspect_service(&self, name: &str) -> OrchestratorResult<Option<ServiceSpec>>;

    /// Tasks whose desired state is `running`
    async fn list_running_tasks(&self, service_name: &str) -> OrchestratorResult<Vec<TaskDescriptor>>;

    /// Explicit capability check before polling stats
    async fn probe_container(&self, container_id: &str) -> OrchestratorResult<Reachability>;

    async fn container_snapshot(&self, container_id: &str) -> OrchestratorResult<ContainerSample>;

    /// Tail of combined stdout/stderr, one entry per line
    async fn service_logs(&self, service_name: &str, tail_lines: usize) -> OrchestratorResult<Vec<String>>;

    async fn ping(&self) -> OrchestratorResult<()>;
}

/// cAdvisor label carrying the Swarm service name
pub const SERVICE_LABEL: &str = "container_label_com_docker_swarm_service_name";

/// Maps tenant identifiers to orchestrator service names, and names the
/// time-series label those services are exported under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNaming {
    prefix: String,
    label: String,
}

impl Default for ServiceNaming {
    fn default() -> Self {
        Self::new("wp_")
    }
}

impl ServiceNaming {
    pub const MAX_TENANT_ID_LEN: usize = 64;

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            label: SERVICE_LABEL.to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn service_name(&self, tenant_id: &str) -> String {
        format!("{}{}", self.prefix, tenant_id)
    }

    /// Tenant ids are restricted to `[A-Za-z0-9_-]{1,64}`
    pub fn is_valid_tenant_id(tenant_id: &str) -> bool {
        !tenant_id.is_empty()
            && tenant_id.len() <= Self::MAX_TENANT_ID_LEN
            && tenant_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

/// First 12 characters, the way Swarm abbreviates ids
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
