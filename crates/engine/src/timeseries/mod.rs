//! Time-series query engine
//!
//! Instant and range queries against a PromQL-speaking backend. Errors are
//! returned to the caller untouched; the synthesizer, history builder and
//! cluster aggregator decide how to degrade.

mod client;
pub mod query;

pub use client::{PrometheusClient, PrometheusConfig};
pub use query::{PromQuery, Selector};

use crate::error::QueryResult;
use crate::models::TimeSeriesPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// `[<unix seconds>, "<value>"]` as returned by the Prometheus API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplePair(pub f64, pub String);

impl SamplePair {
    /// Parsed value; non-finite or unparsable values read as zero
    pub fn value(&self) -> f64 {
        self.1
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn timestamp(&self) -> f64 {
        self.0
    }
}

/// One series of an instant vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    pub value: SamplePair,
}

/// One series of a range matrix
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

impl RangeSeries {
    /// Points for consumers: milliseconds, sorted by timestamp
    pub fn to_points(&self) -> Vec<TimeSeriesPoint> {
        let mut points: Vec<TimeSeriesPoint> = self
            .values
            .iter()
            .map(|pair| TimeSeriesPoint {
                timestamp: (pair.timestamp() * 1000.0).round() as i64,
                value: pair.value(),
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        points
    }
}

/// The `data` member of a successful query response
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    Vector(Vec<InstantSample>),
    Matrix(Vec<RangeSeries>),
    Scalar(SamplePair),
    String(SamplePair),
}

impl QueryData {
    /// First series' most recent value, `None` when the result set is empty
    pub fn first_value(&self) -> Option<f64> {
        match self {
            QueryData::Vector(samples) => samples.first().map(|s| s.value.value()),
            QueryData::Matrix(series) => series
                .first()
                .and_then(|s| s.values.last())
                .map(SamplePair::value),
            QueryData::Scalar(pair) => Some(pair.value()),
            QueryData::String(_) => None,
        }
    }

    /// "First result, first value" with the empty set reading as zero
    pub fn value_or_zero(&self) -> f64 {
        self.first_value().unwrap_or(0.0)
    }

    /// Every series' current value, for queries grouped by a label
    pub fn values(&self) -> Vec<f64> {
        match self {
            QueryData::Vector(samples) => samples.iter().map(|s| s.value.value()).collect(),
            QueryData::Matrix(series) => series
                .iter()
                .filter_map(|s| s.values.last().map(SamplePair::value))
                .collect(),
            QueryData::Scalar(pair) => vec![pair.value()],
            QueryData::String(_) => Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryData::Vector(_) => "vector",
            QueryData::Matrix(_) => "matrix",
            QueryData::Scalar(_) => "scalar",
            QueryData::String(_) => "string",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryData::Vector(samples) => samples.is_empty(),
            QueryData::Matrix(series) => series.is_empty(),
            QueryData::Scalar(_) => false,
            QueryData::String(_) => true,
        }
    }
}

/// Time window for a range query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl RangeWindow {
    /// Window of `length` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, length: Duration, step: Duration) -> Self {
        let length = chrono::Duration::from_std(length).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            start: end - length,
            end,
            step,
        }
    }
}

/// A PromQL-speaking backend
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Evaluate `query` at the current time
    async fn instant(&self, query: &PromQuery) -> QueryResult<QueryData>;

    /// Evaluate `query` over `window`
    async fn range(&self, query: &PromQuery, window: &RangeWindow) -> QueryResult<Vec<RangeSeries>>;

    /// Liveness of the backend; never errors
    async fn is_healthy(&self) -> bool;
}
