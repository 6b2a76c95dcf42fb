//! Health tracking for the aggregator's collaborators
//!
//! The orchestrator and time-series backend are recorded as components so
//! liveness/readiness probes can report which side is failing. A failing
//! backend degrades views; it never makes the aggregator unready on its own.

use crate::timeseries::TimeSeriesBackend;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State of one collaborator as last observed
///
/// There is no failed state: an unreachable collaborator degrades the
/// views it feeds, and the aggregator keeps serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn observed(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `degraded` as soon as one component is
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const TIME_SERIES: &str = "time_series";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared record of collaborator health and startup readiness
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `name`, assumed healthy until the first check
    pub async fn register(&self, name: &str) {
        self.record(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_healthy(&self, name: &str) {
        self.record(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.record(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    async fn record(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::observed(status, message));
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let degraded = state
            .components
            .values()
            .any(|c| c.status == ComponentStatus::Degraded);

        HealthResponse {
            status: if degraded {
                ComponentStatus::Degraded
            } else {
                ComponentStatus::Healthy
            },
            components: state.components.clone(),
        }
    }

    /// Ready once startup finished; degraded collaborators do not count
    pub async fn readiness(&self) -> ReadinessResponse {
        if self.state.read().await.ready {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some("Aggregator not yet initialized".to_string()),
            }
        }
    }
}

/// Liveness check of the time-series backend
#[derive(Clone)]
pub struct HealthProber {
    backend: Arc<dyn TimeSeriesBackend>,
    registry: HealthRegistry,
}

impl HealthProber {
    pub fn new(backend: Arc<dyn TimeSeriesBackend>, registry: HealthRegistry) -> Self {
        Self { backend, registry }
    }

    /// Probe the backend; the result is also recorded in the registry
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.backend.is_healthy().await;
        debug!(healthy, "Time-series backend probed");

        if healthy {
            self.registry.set_healthy(components::TIME_SERIES).await;
        } else {
            // queries still answer with zeroed views
            self.registry
                .set_degraded(components::TIME_SERIES, "time-series backend unreachable")
                .await;
        }
        healthy
    }
}
