//! Integration tests for the aggregator API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use metrics_aggregator::api::{create_router, AppState};
use metrics_aggregator::config::AggregatorConfig;
use metrics_engine::{
    error::{OrchestratorError, OrchestratorResult, QueryError, QueryResult},
    health::{components, HealthRegistry},
    models::{ContainerResourceSnapshot, TaskState},
    orchestrator::{ContainerSample, Orchestrator, Reachability, ServiceSpec, TaskDescriptor},
    timeseries::{
        InstantSample, PromQuery, QueryData, RangeSeries, RangeWindow, SamplePair,
        TimeSeriesBackend,
    },
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// One service `wp_t1` with a local and a remote task
struct FakeSwarm {
    logs_requested: Mutex<Option<usize>>,
    down: bool,
}

impl FakeSwarm {
    fn new() -> Self {
        Self {
            logs_requested: Mutex::new(None),
            down: false,
        }
    }
}

#[async_trait]
impl Orchestrator for FakeSwarm {
    async fn inspect_service(&self, name: &str) -> OrchestratorResult<Option<ServiceSpec>> {
        if self.down {
            return Err(OrchestratorError::Timeout);
        }
        Ok((name == "wp_t1").then(|| ServiceSpec {
            id: "svc1".to_string(),
            name: name.to_string(),
            replicas: Some(2),
            memory_limit: 536870912,
        }))
    }

    async fn list_running_tasks(&self, _service_name: &str) -> OrchestratorResult<Vec<TaskDescriptor>> {
        Ok(vec![
            TaskDescriptor {
                id: "task1".to_string(),
                node_id: "node-local".to_string(),
                slot: Some(1),
                container_id: Some("c-local".to_string()),
                state: TaskState::Running,
                error: None,
            },
            TaskDescriptor {
                id: "task2".to_string(),
                node_id: "node-remote".to_string(),
                slot: Some(2),
                container_id: Some("c-remote".to_string()),
                state: TaskState::Running,
                error: None,
            },
        ])
    }

    async fn probe_container(&self, container_id: &str) -> OrchestratorResult<Reachability> {
        Ok(if container_id == "c-local" {
            Reachability::Local
        } else {
            Reachability::Remote
        })
    }

    async fn container_snapshot(&self, _container_id: &str) -> OrchestratorResult<ContainerSample> {
        let snapshot = |cpu: f64, system: f64| ContainerResourceSnapshot {
            cpu_time_used: cpu,
            system_cpu_time: system,
            online_cpus: 4,
            memory_used: 134217728,
            memory_limit: Some(536870912),
            networks: Default::default(),
        };
        Ok(ContainerSample {
            current: snapshot(12.0, 110.0),
            previous: Some(snapshot(10.0, 100.0)),
        })
    }

    async fn service_logs(&self, service_name: &str, tail_lines: usize) -> OrchestratorResult<Vec<String>> {
        *self.logs_requested.lock().unwrap() = Some(tail_lines);
        if service_name != "wp_t1" {
            return Err(OrchestratorError::NotFound(service_name.to_string()));
        }
        Ok(vec![
            "2024-05-01T12:00:00Z GET / 200".to_string(),
            "2024-05-01T12:00:01Z GET /wp-admin 302".to_string(),
        ])
    }

    async fn ping(&self) -> OrchestratorResult<()> {
        if self.down {
            Err(OrchestratorError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Constant answers; `down` fails every query
struct FakePrometheus {
    down: bool,
}

#[async_trait]
impl TimeSeriesBackend for FakePrometheus {
    async fn instant(&self, query: &PromQuery) -> QueryResult<QueryData> {
        if self.down {
            return Err(QueryError::Timeout);
        }
        let value = if query.as_str().contains("node_uname_info") {
            "3"
        } else if query.as_str().contains("traefik") {
            return Ok(QueryData::Vector(Vec::new()));
        } else {
            "2"
        };
        Ok(QueryData::Vector(vec![InstantSample {
            metric: HashMap::new(),
            value: SamplePair(1714564800.0, value.to_string()),
        }]))
    }

    async fn range(&self, _query: &PromQuery, window: &RangeWindow) -> QueryResult<Vec<RangeSeries>> {
        if self.down {
            return Err(QueryError::Timeout);
        }
        let start = window.start.timestamp() as f64;
        let step = window.step.as_secs() as f64;
        Ok(vec![RangeSeries {
            metric: HashMap::new(),
            values: (0..3)
                .map(|i| SamplePair(start + i as f64 * step, "1".to_string()))
                .collect(),
        }])
    }

    async fn is_healthy(&self) -> bool {
        !self.down
    }
}

struct TestApp {
    router: Router,
    registry: HealthRegistry,
    swarm: Arc<FakeSwarm>,
}

async fn setup(swarm: FakeSwarm, prometheus_down: bool) -> TestApp {
    let registry = HealthRegistry::new();
    registry.register(components::ORCHESTRATOR).await;
    registry.register(components::TIME_SERIES).await;

    let swarm = Arc::new(swarm);
    let state = Arc::new(AppState::new(
        swarm.clone(),
        Arc::new(FakePrometheus {
            down: prometheus_down,
        }),
        registry.clone(),
        &AggregatorConfig::default(),
    ));

    TestApp {
        router: create_router(state),
        registry,
        swarm,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_tenant_metrics_local_and_remote() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/tenants/t1/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0]["stats"]["cpuPercent"], 80.0);
    assert_eq!(records[0]["stats"]["memoryPercent"], 25.0);
    assert_eq!(records[0]["reachable"], true);

    assert_eq!(records[1]["status"], "running");
    assert_eq!(records[1]["reachable"], false);
    assert_eq!(records[1]["stats"]["cpuPercent"], 0.0);
    assert_eq!(records[1]["stats"]["memoryLimit"], 536870912);
}

#[tokio::test]
async fn test_tenant_metrics_unknown_service() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/tenants/t2/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        serde_json::json!([{
            "containerId": "N/A",
            "containerName": "wp_t2",
            "status": "not_found",
            "stats": null
        }])
    );
}

#[tokio::test]
async fn test_invalid_tenant_id_rejected() {
    let app = setup(FakeSwarm::new(), false).await;
    let long = "x".repeat(65);

    for uri in [
        "/tenants/bad.id/metrics".to_string(),
        format!("/monitoring/{}/prometheus", long),
        "/monitoring/a%22b/prometheus/history".to_string(),
    ] {
        let (status, body) = get(&app.router, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("invalid tenant id"));
    }
}

#[tokio::test]
async fn test_tenant_logs() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/tenants/t1/logs?lines=20000").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(*app.swarm.logs_requested.lock().unwrap(), Some(5000));

    let (status, _) = get(&app.router, "/tenants/t1/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*app.swarm.logs_requested.lock().unwrap(), Some(100));
}

#[tokio::test]
async fn test_tenant_logs_unknown_service() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/tenants/ghost/logs").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_tenant_snapshot() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/monitoring/t1/prometheus").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["containerCount"], 2);
    assert_eq!(data["memory"]["limit"], 1073741824.0);
    assert_eq!(data["memory"]["limitEstimated"], true);
    assert!(data["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn test_tenant_snapshot_backend_down() {
    let app = setup(FakeSwarm::new(), true).await;

    let (status, body) = get(&app.router, "/monitoring/t3/prometheus").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["containerCount"], 0);
    assert_eq!(body["data"]["cpu"]["current"], 0.0);
}

#[tokio::test]
async fn test_history_ranges() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/monitoring/t1/prometheus/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["range"], "1H");
    let cpu = body["data"]["cpu"].as_array().unwrap();
    assert_eq!(
        cpu[1]["timestamp"].as_i64().unwrap() - cpu[0]["timestamp"].as_i64().unwrap(),
        60_000
    );

    let (status, body) = get(&app.router, "/monitoring/t1/prometheus/history?range=7d").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["range"], "7D");

    let (status, body) = get(&app.router, "/monitoring/t1/prometheus/history?range=2W").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_cluster_overview() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/monitoring/cluster/overview").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nodeCount"], 3);
    assert_eq!(body["data"]["requestsPerSecond"], 0.0);
    assert_eq!(body["data"]["proxyMetricsAvailable"], false);
}

#[tokio::test]
async fn test_backend_health_probe() {
    let app = setup(FakeSwarm::new(), true).await;

    let (status, body) = get(&app.router, "/monitoring/prometheus/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["healthy"], false);
    assert!(body["data"]["timestamp"].is_string());

    let health = app.registry.health().await;
    assert_eq!(
        health.components[components::TIME_SERIES].status,
        metrics_engine::ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_healthz_reports_degraded_backends() {
    let swarm = FakeSwarm {
        down: true,
        ..FakeSwarm::new()
    };
    let app = setup(swarm, true).await;

    let (status, body) = get(&app.router, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["orchestrator"]["status"], "degraded");
    assert_eq!(body["components"]["time_series"]["status"], "degraded");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let app = setup(FakeSwarm::new(), false).await;

    let (status, body) = get(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    app.registry.set_ready(true).await;
    let (status, body) = get(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup(FakeSwarm::new(), true).await;

    // Trigger a degraded view so the counter has a sample
    get(&app.router, "/monitoring/cluster/overview").await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("wp_metrics_degraded_views_total"));
}
