//! Metrics aggregator service: HTTP surface over the metrics engine

pub mod api;
pub mod config;
