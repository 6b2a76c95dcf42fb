//! Docker Engine API client (Swarm mode)
//!
//! Talks HTTP to the engine, normally through a read-only socket proxy.

use super::logs::demux_log_stream;
use super::{ContainerSample, Orchestrator, Reachability, ServiceSpec, TaskDescriptor};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ContainerResourceSnapshot, InterfaceCounters, TaskState};
use crate::observability::EngineMetrics;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;
use url::Url;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Configuration for the Docker client
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Engine endpoint, e.g. `http://docker-socket-proxy:2375`
    pub base_url: String,
    /// API version path segment
    pub api_version: String,
    pub request_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://docker-socket-proxy:2375".to_string(),
            api_version: "v1.43".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Docker Engine API client
#[derive(Clone)]
pub struct DockerClient {
    client: Client,
    base_url: Url,
    metrics: EngineMetrics,
}

impl DockerClient {
    pub fn new(config: DockerConfig) -> OrchestratorResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(OrchestratorError::Transport)?;

        let mut base = config.base_url.trim_end_matches('/').to_string();
        if !config.api_version.is_empty() {
            base.push('/');
            base.push_str(config.api_version.trim_matches('/'));
        }
        base.push('/');

        let base_url = Url::parse(&base)
            .map_err(|e| OrchestratorError::Decode(format!("invalid Docker URL: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            metrics: EngineMetrics::new(),
        })
    }

    fn endpoint(&self, path: &str) -> OrchestratorResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OrchestratorError::Decode(format!("invalid path {}: {}", path, e)))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> OrchestratorResult<Response> {
        let url = self.endpoint(path)?;
        let result = self.client.get(url).query(query).send().await;

        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                self.metrics.inc_orchestrator_failures();
                Err(e.into())
            }
        }
    }

    /// Turn a non-2xx response into an error; 404 becomes `NotFound(what)`
    async fn check(&self, response: Response, what: &str) -> OrchestratorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(OrchestratorError::NotFound(what.to_string()));
        }

        self.metrics.inc_orchestrator_failures();
        let body = response.text().await.unwrap_or_default();
        Err(OrchestratorError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> OrchestratorResult<T> {
        let response = self.get(path, query).await?;
        let response = self.check(response, what).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| OrchestratorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Orchestrator for DockerClient {
    async fn inspect_service(&self, name: &str) -> OrchestratorResult<Option<ServiceSpec>> {
        let path = format!("services/{}", name);
        match self.get_json::<RawService>(&path, &[], name).await {
            Ok(raw) => Ok(Some(raw.into_spec())),
            Err(OrchestratorError::NotFound(_)) => {
                debug!(service = %name, "Service not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_running_tasks(&self, service_name: &str) -> OrchestratorResult<Vec<TaskDescriptor>> {
        let filters = serde_json::json!({
            "service": [service_name],
            "desired-state": ["running"],
        });
        let raw: Vec<RawTask> = self
            .get_json("tasks", &[("filters", filters.to_string())], service_name)
            .await?;

        Ok(raw.into_iter().map(RawTask::into_descriptor).collect())
    }

    async fn probe_container(&self, container_id: &str) -> OrchestratorResult<Reachability> {
        let path = format!("containers/{}/json", container_id);
        let response = self.get(&path, &[]).await?;

        match self.check(response, container_id).await {
            Ok(_) => Ok(Reachability::Local),
            Err(OrchestratorError::NotFound(_)) => Ok(Reachability::Remote),
            Err(e) => Err(e),
        }
    }

    async fn container_snapshot(&self, container_id: &str) -> OrchestratorResult<ContainerSample> {
        let path = format!("containers/{}/stats", container_id);
        let raw: RawStats = self
            .get_json(&path, &[("stream", "false".to_string())], container_id)
            .await?;

        Ok(raw.into_sample())
    }

    async fn service_logs(&self, service_name: &str, tail_lines: usize) -> OrchestratorResult<Vec<String>> {
        let path = format!("services/{}/logs", service_name);
        let query = [
            ("stdout", "true".to_string()),
            ("stderr", "true".to_string()),
            ("timestamps", "true".to_string()),
            ("tail", tail_lines.to_string()),
        ];

        let response = self.get(&path, &query).await?;
        let response = self.check(response, service_name).await?;
        let body = response.bytes().await?;

        Ok(demux_log_stream(&body))
    }

    async fn ping(&self) -> OrchestratorResult<()> {
        let response = self.get("_ping", &[]).await?;
        self.check(response, "_ping").await?;
        Ok(())
    }
}

// Docker Engine API payloads (only the fields we read)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawService {
    #[serde(rename = "ID")]
    id: String,
    spec: RawServiceSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawServiceSpec {
    name: String,
    #[serde(default)]
    mode: Option<RawServiceMode>,
    #[serde(default)]
    task_template: Option<RawTaskTemplate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawServiceMode {
    #[serde(default)]
    replicated: Option<RawReplicated>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawReplicated {
    #[serde(default)]
    replicas: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTaskTemplate {
    #[serde(default)]
    resources: Option<RawResources>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawResources {
    #[serde(default)]
    limits: Option<RawLimits>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLimits {
    #[serde(default)]
    memory_bytes: Option<u64>,
}

impl RawService {
    fn into_spec(self) -> ServiceSpec {
        let replicas = self
            .spec
            .mode
            .and_then(|m| m.replicated)
            .and_then(|r| r.replicas);
        let memory_limit = self
            .spec
            .task_template
            .and_then(|t| t.resources)
            .and_then(|r| r.limits)
            .and_then(|l| l.memory_bytes)
            .unwrap_or(0);

        ServiceSpec {
            id: self.id,
            name: self.spec.name,
            replicas,
            memory_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTask {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "NodeID", default)]
    node_id: String,
    #[serde(default)]
    slot: Option<u64>,
    status: RawTaskStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTaskStatus {
    state: TaskState,
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    container_status: Option<RawContainerStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContainerStatus {
    #[serde(rename = "ContainerID", default)]
    container_id: Option<String>,
}

impl RawTask {
    fn into_descriptor(self) -> TaskDescriptor {
        let container_id = self
            .status
            .container_status
            .and_then(|c| c.container_id)
            .filter(|id| !id.is_empty());

        TaskDescriptor {
            id: self.id,
            node_id: self.node_id,
            slot: self.slot,
            container_id,
            state: self.status.state,
            error: self.status.err.filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawStats {
    #[serde(default)]
    cpu_stats: RawCpuStats,
    #[serde(default)]
    precpu_stats: RawCpuStats,
    #[serde(default)]
    memory_stats: RawMemoryStats,
    #[serde(default)]
    networks: Option<HashMap<String, RawNetwork>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCpuStats {
    #[serde(default)]
    cpu_usage: RawCpuUsage,
    #[serde(default)]
    system_cpu_usage: Option<u64>,
    #[serde(default)]
    online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCpuUsage {
    #[serde(default)]
    total_usage: u64,
    #[serde(default)]
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMemoryStats {
    #[serde(default)]
    usage: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    stats: HashMap<String, u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    #[serde(default)]
    rx_bytes: u64,
    #[serde(default)]
    tx_bytes: u64,
}

impl RawCpuStats {
    fn online_cpus(&self) -> u32 {
        self.online_cpus
            .filter(|n| *n > 0)
            .or_else(|| {
                self.cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|v| v.len() as u32)
                    .filter(|n| *n > 0)
            })
            .unwrap_or(1)
    }
}

impl RawMemoryStats {
    /// Usage minus reclaimable page cache, as `docker stats` reports it
    fn working_set(&self) -> u64 {
        let usage = self.usage.unwrap_or(0);
        let inactive_file = self
            .stats
            .get("inactive_file")
            .or_else(|| self.stats.get("total_inactive_file"))
            .copied()
            .unwrap_or(0);
        usage.saturating_sub(inactive_file)
    }
}

impl RawStats {
    fn into_sample(self) -> ContainerSample {
        let networks: BTreeMap<String, InterfaceCounters> = self
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, n)| {
                (
                    name,
                    InterfaceCounters {
                        rx_bytes: n.rx_bytes,
                        tx_bytes: n.tx_bytes,
                    },
                )
            })
            .collect();

        let memory_used = self.memory_stats.working_set();
        let memory_limit = self.memory_stats.limit.filter(|l| *l > 0);

        let snapshot_of = |cpu: &RawCpuStats| ContainerResourceSnapshot {
            cpu_time_used: cpu.cpu_usage.total_usage as f64 / NANOS_PER_SEC,
            system_cpu_time: cpu.system_cpu_usage.unwrap_or(0) as f64 / NANOS_PER_SEC,
            online_cpus: cpu.online_cpus(),
            memory_used,
            memory_limit,
            networks: networks.clone(),
        };

        let current = snapshot_of(&self.cpu_stats);
        // The engine leaves precpu_stats empty on the first read of a container
        let previous = match self.precpu_stats.system_cpu_usage {
            Some(system) if system > 0 => Some(snapshot_of(&self.precpu_stats)),
            _ => None,
        };

        ContainerSample { current, previous }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_spec() {
        let json = r#"{
            "ID": "9mnpnzenvg8p8tdbtq4wvbkcz",
            "Spec": {
                "Name": "wp_t1",
                "Mode": {"Replicated": {"Replicas": 2}},
                "TaskTemplate": {"Resources": {"Limits": {"MemoryBytes": 536870912}}}
            }
        }"#;
        let spec = serde_json::from_str::<RawService>(json).unwrap().into_spec();

        assert_eq!(spec.name, "wp_t1");
        assert_eq!(spec.replicas, Some(2));
        assert_eq!(spec.memory_limit, 536870912);
    }

    #[test]
    fn test_parse_global_service_without_limits() {
        let json = r#"{"ID": "abc", "Spec": {"Name": "wp_g", "Mode": {"Global": {}}}}"#;
        let spec = serde_json::from_str::<RawService>(json).unwrap().into_spec();

        assert_eq!(spec.replicas, None);
        assert_eq!(spec.memory_limit, 0);
    }

    #[test]
    fn test_parse_task() {
        let json = r#"{
            "ID": "0kzzo1i0y4jz6027t0k7aezc7",
            "NodeID": "60gvrl6tm78dmak4yl7srz94v",
            "Slot": 1,
            "DesiredState": "running",
            "Status": {
                "State": "running",
                "ContainerStatus": {"ContainerID": "e5d62702a1b48d01c3e02ca1e0212a250801fa8d67caca0b6f35919ebc12f035"}
            }
        }"#;
        let task = serde_json::from_str::<RawTask>(json).unwrap().into_descriptor();

        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.slot, Some(1));
        assert!(task.container_id.unwrap().starts_with("e5d62702"));
        assert_eq!(task.error, None);
    }

    #[test]
    fn test_parse_pending_task_without_container() {
        let json = r#"{
            "ID": "t2", "NodeID": "", "Status": {"State": "pending", "Err": "no suitable node", "ContainerStatus": {}}
        }"#;
        let task = serde_json::from_str::<RawTask>(json).unwrap().into_descriptor();

        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.container_id, None);
        assert_eq!(task.error.as_deref(), Some("no suitable node"));
    }

    #[test]
    fn test_parse_stats_with_precpu() {
        let json = r#"{
            "cpu_stats": {
                "cpu_usage": {"total_usage": 12000000000},
                "system_cpu_usage": 110000000000,
                "online_cpus": 4
            },
            "precpu_stats": {
                "cpu_usage": {"total_usage": 10000000000},
                "system_cpu_usage": 100000000000,
                "online_cpus": 4
            },
            "memory_stats": {
                "usage": 157286400,
                "limit": 536870912,
                "stats": {"inactive_file": 52428800}
            },
            "networks": {
                "eth0": {"rx_bytes": 1000, "tx_bytes": 2000},
                "eth1": {"rx_bytes": 500, "tx_bytes": 250}
            }
        }"#;
        let sample = serde_json::from_str::<RawStats>(json).unwrap().into_sample();

        assert_eq!(sample.current.cpu_time_used, 12.0);
        assert_eq!(sample.current.system_cpu_time, 110.0);
        assert_eq!(sample.current.online_cpus, 4);
        assert_eq!(sample.current.memory_used, 104857600);
        assert_eq!(sample.current.memory_limit, Some(536870912));
        assert_eq!(sample.current.networks.len(), 2);

        let previous = sample.previous.unwrap();
        assert_eq!(previous.cpu_time_used, 10.0);
        assert_eq!(previous.system_cpu_time, 100.0);
    }

    #[test]
    fn test_parse_first_stats_read() {
        let json = r#"{
            "cpu_stats": {"cpu_usage": {"total_usage": 5, "percpu_usage": [1, 2, 1, 1]}, "system_cpu_usage": 100},
            "precpu_stats": {"cpu_usage": {"total_usage": 0}},
            "memory_stats": {"usage": 100, "stats": {"total_inactive_file": 40}}
        }"#;
        let sample = serde_json::from_str::<RawStats>(json).unwrap().into_sample();

        assert!(sample.previous.is_none());
        assert_eq!(sample.current.online_cpus, 4);
        assert_eq!(sample.current.memory_used, 60);
        assert_eq!(sample.current.memory_limit, None);
        assert!(sample.current.networks.is_empty());
    }
}
