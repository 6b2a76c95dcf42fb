//! Chart-ready history for a tenant
//!
//! Unlike the snapshot, history degrades per metric: a failed query
//! empties that one series and the rest are still returned.

use crate::error::QueryResult;
use crate::models::{HistoryRange, NetworkHistory, TenantHistory, TimeSeries};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::orchestrator::ServiceNaming;
use crate::synthesizer::RATE_WINDOW;
use crate::timeseries::{PromQuery, RangeSeries, RangeWindow, Selector, TimeSeriesBackend};
use chrono::Utc;
use std::sync::Arc;

pub struct HistoricalSeriesBuilder {
    backend: Arc<dyn TimeSeriesBackend>,
    naming: ServiceNaming,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl HistoricalSeriesBuilder {
    pub fn new(backend: Arc<dyn TimeSeriesBackend>, naming: ServiceNaming) -> Self {
        Self {
            backend,
            naming,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::default(),
        }
    }

    /// Series for `range` ending now, at the range's fixed step
    pub async fn history(&self, tenant_id: &str, range: HistoryRange) -> TenantHistory {
        let service_name = self.naming.service_name(tenant_id);
        let window = RangeWindow::ending_at(Utc::now(), range.window(), range.step());

        let scope = Selector::new("container_cpu_usage_seconds_total")
            .eq(self.naming.label(), service_name.as_str());
        let cpu = PromQuery::rate(&scope, RATE_WINDOW).sum().scale(100.0);
        let memory = PromQuery::select(&scope.with_metric("container_memory_usage_bytes")).sum();
        let rx = PromQuery::rate(
            &scope.with_metric("container_network_receive_bytes_total"),
            RATE_WINDOW,
        )
        .sum();
        let tx = PromQuery::rate(
            &scope.with_metric("container_network_transmit_bytes_total"),
            RATE_WINDOW,
        )
        .sum();

        let backend = self.backend.as_ref();
        let (cpu, memory, rx, tx) = tokio::join!(
            backend.range(&cpu, &window),
            backend.range(&memory, &window),
            backend.range(&rx, &window),
            backend.range(&tx, &window),
        );

        TenantHistory {
            cpu: self.series(tenant_id, "cpu", cpu),
            memory: self.series(tenant_id, "memory", memory),
            network: NetworkHistory {
                rx: self.series(tenant_id, "network_rx", rx),
                tx: self.series(tenant_id, "network_tx", tx),
            },
            range,
        }
    }

    /// First series' points, or empty if the query failed
    fn series(&self, tenant_id: &str, metric: &str, result: QueryResult<Vec<RangeSeries>>) -> TimeSeries {
        match result {
            Ok(series) => series.first().map(RangeSeries::to_points).unwrap_or_default(),
            Err(e) => {
                self.logger.log_degraded_view(
                    "history",
                    Some(tenant_id),
                    &format!("{} series unavailable: {}", metric, e),
                );
                self.metrics.inc_degraded_view("history");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::timeseries::{QueryData, SamplePair};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Emits one point per step across the requested window
    struct SteppedBackend {
        fail_network: bool,
        windows: Mutex<Vec<RangeWindow>>,
        queries: Mutex<Vec<String>>,
    }

    impl SteppedBackend {
        fn new(fail_network: bool) -> Self {
            Self {
                fail_network,
                windows: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TimeSeriesBackend for SteppedBackend {
        async fn instant(&self, _query: &PromQuery) -> QueryResult<QueryData> {
            Ok(QueryData::Vector(Vec::new()))
        }

        async fn range(&self, query: &PromQuery, window: &RangeWindow) -> QueryResult<Vec<RangeSeries>> {
            self.windows.lock().unwrap().push(*window);
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail_network && query.as_str().contains("container_network") {
                return Err(QueryError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }

            let step = window.step.as_secs() as i64;
            let start = window.start.timestamp();
            let end = window.end.timestamp();
            let values = (0..)
                .map(|i| start + i * step)
                .take_while(|t| *t <= end)
                .map(|t| SamplePair(t as f64, "1.5".to_string()))
                .collect();

            Ok(vec![RangeSeries {
                metric: HashMap::new(),
                values,
            }])
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_one_hour_points_spaced_one_minute() {
        let backend = Arc::new(SteppedBackend::new(false));
        let builder = HistoricalSeriesBuilder::new(backend.clone(), ServiceNaming::default());

        let history = builder.history("t1", HistoryRange::OneHour).await;

        assert_eq!(history.range, HistoryRange::OneHour);
        assert_eq!(history.cpu.len(), 61);
        for pair in history.cpu.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, 60_000);
        }
        assert_eq!(history.memory.len(), 61);
        assert_eq!(history.network.rx.len(), 61);
        assert_eq!(history.network.tx[0].value, 1.5);

        let windows = backend.windows.lock().unwrap();
        assert_eq!(windows.len(), 4);
        assert!(windows.iter().all(|w| w.step.as_secs() == 60));
    }

    #[tokio::test]
    async fn test_step_follows_range() {
        let backend = Arc::new(SteppedBackend::new(false));
        let builder = HistoricalSeriesBuilder::new(backend.clone(), ServiceNaming::default());

        let history = builder.history("t1", HistoryRange::SevenDays).await;
        assert_eq!(history.cpu[1].timestamp - history.cpu[0].timestamp, 3_600_000);
        assert_eq!(history.cpu.len(), 7 * 24 + 1);

        let history = builder.history("t1", HistoryRange::OneDay).await;
        assert_eq!(history.memory[1].timestamp - history.memory[0].timestamp, 300_000);
    }

    #[tokio::test]
    async fn test_series_scoped_by_naming_label() {
        let backend = Arc::new(SteppedBackend::new(false));
        let builder = HistoricalSeriesBuilder::new(
            backend.clone(),
            ServiceNaming::default().with_label("service"),
        );

        builder.history("t1", HistoryRange::OneHour).await;

        let queries = backend.queries.lock().unwrap();
        assert_eq!(queries.len(), 4);
        assert!(queries.iter().all(|q| q.contains(r#"{service="wp_t1"}"#)), "{:?}", queries);
    }

    #[tokio::test]
    async fn test_network_failure_isolated() {
        let builder =
            HistoricalSeriesBuilder::new(Arc::new(SteppedBackend::new(true)), ServiceNaming::default());

        let history = builder.history("t1", HistoryRange::OneHour).await;

        assert!(!history.cpu.is_empty());
        assert!(!history.memory.is_empty());
        assert!(history.network.rx.is_empty());
        assert!(history.network.tx.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_series() {
        struct EmptyBackend;

        #[async_trait]
        impl TimeSeriesBackend for EmptyBackend {
            async fn instant(&self, _query: &PromQuery) -> QueryResult<QueryData> {
                Ok(QueryData::Vector(Vec::new()))
            }
            async fn range(&self, _query: &PromQuery, _window: &RangeWindow) -> QueryResult<Vec<RangeSeries>> {
                Ok(Vec::new())
            }
            async fn is_healthy(&self) -> bool {
                true
            }
        }

        let builder = HistoricalSeriesBuilder::new(Arc::new(EmptyBackend), ServiceNaming::default());
        let history = builder.history("new-site", HistoryRange::OneDay).await;

        assert!(history.cpu.is_empty());
        assert!(history.network.rx.is_empty());
        assert_eq!(history.range, HistoryRange::OneDay);
    }
}
