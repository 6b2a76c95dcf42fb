//! Aggregator configuration
//!
//! Every key can be set through a `METRICS_`-prefixed environment
//! variable, e.g. `METRICS_PROMETHEUS_URL`.

use anyhow::{Context, Result};
use metrics_engine::collector::CollectorConfig;
use metrics_engine::orchestrator::{DockerConfig, ServiceNaming, SERVICE_LABEL};
use metrics_engine::synthesizer::SynthesizerConfig;
use metrics_engine::timeseries::PrometheusConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// HTTP port for the API, health and metrics endpoints
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Docker Engine endpoint (a read-only socket proxy)
    #[serde(default = "default_docker_url")]
    pub docker_url: String,

    #[serde(default = "default_docker_api_version")]
    pub docker_api_version: String,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Timeout applied to every outbound request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Tasks polled concurrently within one tenant request
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    /// Tenant id to service name prefix
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,

    /// Time-series label holding the service name; scopes every tenant query
    #[serde(default = "default_service_label")]
    pub service_label: String,

    #[serde(default = "default_assumed_container_memory")]
    pub assumed_container_memory_bytes: u64,

    #[serde(default = "default_sample_cache_capacity")]
    pub sample_cache_capacity: usize,

    #[serde(default = "default_sample_cache_ttl")]
    pub sample_cache_ttl_secs: u64,
}

fn default_listen_port() -> u16 {
    8080
}

fn default_docker_url() -> String {
    "http://docker-socket-proxy:2375".to_string()
}

fn default_docker_api_version() -> String {
    "v1.43".to_string()
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent_queries() -> usize {
    16
}

fn default_max_concurrent_polls() -> usize {
    4
}

fn default_service_prefix() -> String {
    "wp_".to_string()
}

fn default_service_label() -> String {
    SERVICE_LABEL.to_string()
}

fn default_assumed_container_memory() -> u64 {
    512 * 1024 * 1024
}

fn default_sample_cache_capacity() -> usize {
    4096
}

fn default_sample_cache_ttl() -> u64 {
    300
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            docker_url: default_docker_url(),
            docker_api_version: default_docker_api_version(),
            prometheus_url: default_prometheus_url(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_queries: default_max_concurrent_queries(),
            max_concurrent_polls: default_max_concurrent_polls(),
            service_prefix: default_service_prefix(),
            service_label: default_service_label(),
            assumed_container_memory_bytes: default_assumed_container_memory(),
            sample_cache_capacity: default_sample_cache_capacity(),
            sample_cache_ttl_secs: default_sample_cache_ttl(),
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("METRICS").try_parsing(true))
            .build()
            .context("failed to read METRICS_* environment")?;

        config
            .try_deserialize()
            .context("invalid METRICS_* configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn naming(&self) -> ServiceNaming {
        ServiceNaming::new(self.service_prefix.clone()).with_label(self.service_label.clone())
    }

    pub fn docker(&self) -> DockerConfig {
        DockerConfig {
            base_url: self.docker_url.clone(),
            api_version: self.docker_api_version.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn prometheus(&self) -> PrometheusConfig {
        PrometheusConfig {
            base_url: self.prometheus_url.clone(),
            request_timeout: self.request_timeout(),
            max_concurrent_queries: self.max_concurrent_queries,
        }
    }

    pub fn collector(&self) -> CollectorConfig {
        CollectorConfig {
            max_concurrent_polls: self.max_concurrent_polls,
        }
    }

    pub fn synthesizer(&self) -> SynthesizerConfig {
        SynthesizerConfig {
            assumed_container_memory_bytes: self.assumed_container_memory_bytes,
        }
    }

    pub fn sample_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.sample_cache_ttl_secs)
    }
}
