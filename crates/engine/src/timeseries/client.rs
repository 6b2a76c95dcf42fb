//! HTTP client for the Prometheus query API

use super::{PromQuery, QueryData, RangeSeries, RangeWindow, TimeSeriesBackend};
use crate::error::{QueryError, QueryResult};
use crate::observability::EngineMetrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL, e.g. `http://prometheus:9090`
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum in-flight queries across all requests
    pub max_concurrent_queries: usize,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: "http://prometheus:9090".to_string(),
            request_timeout: Duration::from_secs(10),
            max_concurrent_queries: 16,
        }
    }
}

/// Response envelope of `/api/v1/query` and `/api/v1/query_range`
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn backend_error(self) -> QueryError {
        QueryError::Backend {
            error_type: self.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: self.error.unwrap_or_default(),
        }
    }

    fn into_data(self) -> QueryResult<T> {
        if self.status != "success" {
            return Err(self.backend_error());
        }
        self.data
            .ok_or_else(|| QueryError::Decode("success response without data".to_string()))
    }
}

/// Prometheus HTTP API client
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
    permits: Arc<Semaphore>,
    metrics: EngineMetrics,
}

impl PrometheusClient {
    pub fn new(config: PrometheusConfig) -> QueryResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(QueryError::Transport)?;

        // Relative joins drop the last path segment unless it ends in '/'
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| QueryError::Decode(format!("invalid Prometheus URL: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            permits: Arc::new(Semaphore::new(config.max_concurrent_queries.max(1))),
            metrics: EngineMetrics::new(),
        })
    }

    fn endpoint(&self, path: &str) -> QueryResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| QueryError::Decode(format!("invalid path {}: {}", path, e)))
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        kind: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> QueryResult<T> {
        let url = self.endpoint(path)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| QueryError::Decode("query limiter closed".to_string()))?;

        let started = Instant::now();
        let result = self.send(url, params).await;
        self.metrics
            .observe_query_latency(kind, started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            self.metrics.inc_query_failures(kind);
            warn!(kind, error = %e, "Time-series query failed");
        }
        result
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> QueryResult<T> {
        let response = self.client.get(url).query(params).send().await?;

        // Prometheus answers 400/422 with a JSON error envelope; surface it
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
                if envelope.status == "error" {
                    return Err(envelope.backend_error());
                }
            }
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| QueryError::Decode(e.to_string()))?;
        envelope.into_data()
    }
}

#[async_trait]
impl TimeSeriesBackend for PrometheusClient {
    async fn instant(&self, query: &PromQuery) -> QueryResult<QueryData> {
        debug!(query = %query, "Instant query");
        self.get_data("instant", "api/v1/query", &[("query", query.to_string())])
            .await
    }

    async fn range(&self, query: &PromQuery, window: &RangeWindow) -> QueryResult<Vec<RangeSeries>> {
        debug!(query = %query, step_secs = window.step.as_secs(), "Range query");
        let params = [
            ("query", query.to_string()),
            ("start", window.start.timestamp().to_string()),
            ("end", window.end.timestamp().to_string()),
            ("step", window.step.as_secs().max(1).to_string()),
        ];

        match self.get_data("range", "api/v1/query_range", &params).await? {
            QueryData::Matrix(series) => Ok(series),
            other => Err(QueryError::Decode(format!(
                "expected matrix result, got {}",
                other.kind()
            ))),
        }
    }

    async fn is_healthy(&self) -> bool {
        let url = match self.endpoint("-/healthy") {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Time-series health probe failed");
                false
            }
        }
    }
}
