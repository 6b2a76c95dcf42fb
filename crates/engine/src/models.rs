//! Core data models for the metrics engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Cumulative network counters for one container interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One point-in-time read of a single container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResourceSnapshot {
    /// Cumulative CPU time consumed by the container, in seconds
    pub cpu_time_used: f64,
    /// Cumulative CPU time of the whole host, in seconds
    pub system_cpu_time: f64,
    pub online_cpus: u32,
    pub memory_used: u64,
    pub memory_limit: Option<u64>,
    /// Keyed by interface name
    pub networks: BTreeMap<String, InterfaceCounters>,
}

/// Normalized stat block attached to a task record
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

impl ContainerStats {
    /// All-zero block that still reports the service memory limit,
    /// so consumers can render "0 / limit"
    pub fn zeroed(memory_limit: u64) -> Self {
        Self {
            memory_limit,
            ..Default::default()
        }
    }
}

/// Lifecycle state of a task record
///
/// The orchestrator states come straight from Swarm; `NotFound`, `NoTasks`
/// and `Error` only appear on synthetic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
    Remove,
    Orphaned,
    NotFound,
    NoTasks,
    Error,
    #[serde(other)]
    Unknown,
}

/// Placeholder container id for records without a container
pub const NO_CONTAINER: &str = "N/A";

/// One task of a tenant's service, or a synthetic record describing
/// why there are none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetricRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub container_id: String,
    pub container_name: String,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `Some(false)` when the container lives on a node this process cannot poll
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    pub stats: Option<ContainerStats>,
}

impl TaskMetricRecord {
    fn synthetic(service_name: &str, status: TaskState) -> Self {
        Self {
            task_id: None,
            node_id: None,
            container_id: NO_CONTAINER.to_string(),
            container_name: service_name.to_string(),
            status,
            error: None,
            reachable: None,
            stats: None,
        }
    }

    pub fn not_found(service_name: &str) -> Self {
        Self::synthetic(service_name, TaskState::NotFound)
    }

    pub fn no_tasks(service_name: &str, memory_limit: u64) -> Self {
        Self {
            stats: Some(ContainerStats::zeroed(memory_limit)),
            ..Self::synthetic(service_name, TaskState::NoTasks)
        }
    }

    pub fn error(service_name: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::synthetic(service_name, TaskState::Error)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    pub current: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub current: f64,
    pub limit: f64,
    pub percent: f64,
    /// The limit is `containerCount * assumed per-container memory`,
    /// not a measured value
    pub limit_estimated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkUsage {
    pub rx_bytes: f64,
    pub tx_bytes: f64,
    pub rx_rate: f64,
    pub tx_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used: f64,
    pub total: f64,
    pub percent: f64,
}

/// Single-service rollup from the time-series backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMetrics {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub network: NetworkUsage,
    pub storage: StorageUsage,
    pub container_count: u64,
    /// Wall-clock time the snapshot was assembled
    pub timestamp: DateTime<Utc>,
}

impl TenantMetrics {
    /// The degraded snapshot returned when any backend query fails
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            cpu: CpuUsage::default(),
            memory: MemoryUsage::default(),
            network: NetworkUsage::default(),
            storage: StorageUsage::default(),
            container_count: 0,
            timestamp,
        }
    }
}

/// A sample as handed to consumers: timestamp in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

pub type TimeSeries = Vec<TimeSeriesPoint>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkHistory {
    pub rx: TimeSeries,
    pub tx: TimeSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantHistory {
    pub cpu: TimeSeries,
    pub memory: TimeSeries,
    pub network: NetworkHistory,
    pub range: HistoryRange,
}

/// Chart window selectable by callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[default]
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "24H")]
    OneDay,
    #[serde(rename = "7D")]
    SevenDays,
}

impl HistoryRange {
    pub fn window(&self) -> Duration {
        match self {
            HistoryRange::OneHour => Duration::from_secs(60 * 60),
            HistoryRange::OneDay => Duration::from_secs(24 * 60 * 60),
            HistoryRange::SevenDays => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Fixed step per window; not caller-overridable
    pub fn step(&self) -> Duration {
        match self {
            HistoryRange::OneHour => Duration::from_secs(60),
            HistoryRange::OneDay => Duration::from_secs(5 * 60),
            HistoryRange::SevenDays => Duration::from_secs(60 * 60),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::OneHour => "1H",
            HistoryRange::OneDay => "24H",
            HistoryRange::SevenDays => "7D",
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "1H" => Ok(HistoryRange::OneHour),
            "24H" => Ok(HistoryRange::OneDay),
            "7D" => Ok(HistoryRange::SevenDays),
            other => Err(format!("unsupported range '{}', expected 1H, 24H or 7D", other)),
        }
    }
}

/// Cluster-wide rollup, independent of any tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    pub total_cpu: f64,
    pub total_memory: f64,
    pub total_containers: u64,
    pub node_count: u64,
    pub tenant_count: u64,
    pub requests_per_second: f64,
    pub avg_latency: f64,
    /// False when the reverse proxy exported no series at all, so a zero
    /// request rate means "unknown" rather than "idle"
    pub proxy_metrics_available: bool,
}

/// Result of a time-series backend liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
}

/// Envelope for every HTTP response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_record_shape() {
        let record = TaskMetricRecord::not_found("wp_t2");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "containerId": "N/A",
                "containerName": "wp_t2",
                "status": "not_found",
                "stats": null
            })
        );
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = serde_json::to_value(ApiResponse::success(vec!["line"])).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "data": ["line"]}));

        let err = serde_json::to_value(ApiResponse::<()>::error("invalid tenant id")).unwrap();
        assert_eq!(err, serde_json::json!({"success": false, "error": "invalid tenant id"}));

        let parsed: ApiResponse<ClusterMetrics> =
            serde_json::from_str(r#"{"success":false,"error":"boom"}"#).unwrap();
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_no_tasks_record_keeps_limit() {
        let record = TaskMetricRecord::no_tasks("wp_t1", 268435456);
        let stats = record.stats.unwrap();
        assert_eq!(record.status, TaskState::NoTasks);
        assert_eq!(stats.memory_limit, 268435456);
        assert_eq!(stats.memory_usage, 0);
        assert_eq!(stats.cpu_percent, 0.0);
    }

    #[test]
    fn test_task_state_unknown_fallback() {
        let state: TaskState = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(state, TaskState::Unknown);
        let state: TaskState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(state, TaskState::Running);
    }

    #[test]
    fn test_history_range_parse() {
        assert_eq!("1H".parse::<HistoryRange>().unwrap(), HistoryRange::OneHour);
        assert_eq!("24h".parse::<HistoryRange>().unwrap(), HistoryRange::OneDay);
        assert_eq!("7D".parse::<HistoryRange>().unwrap(), HistoryRange::SevenDays);
        assert!("30D".parse::<HistoryRange>().is_err());

        assert_eq!(HistoryRange::OneDay.step(), Duration::from_secs(300));
        assert_eq!(
            serde_json::to_string(&HistoryRange::SevenDays).unwrap(),
            "\"7D\""
        );
    }

    #[test]
    fn test_tenant_metrics_timestamp_is_iso8601() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(TenantMetrics::zeroed(ts)).unwrap();

        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(json["containerCount"], 0);
        assert_eq!(json["memory"]["limitEstimated"], false);
        assert_eq!(json["network"]["rxRate"], 0.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(80.00000000000001), 80.0);
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(f64::NAN), 0.0);
    }
}
