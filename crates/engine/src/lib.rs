//! Metrics engine for a multi-tenant WordPress hosting cluster
//!
//! This crate provides:
//! - Per-task container metrics from the Swarm orchestrator
//! - Tenant rollups and chart history from a Prometheus-compatible backend
//! - A cluster-wide overview
//! - Health tracking and self-observability

pub mod cluster;
pub mod collector;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod synthesizer;
pub mod timeseries;

pub use cluster::ClusterAggregator;
pub use collector::{CollectorConfig, SampleCache, TaskMetricsCollector};
pub use error::{OrchestratorError, QueryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthProber, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use history::HistoricalSeriesBuilder;
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use synthesizer::{SynthesizerConfig, TenantMetricsSynthesizer};
