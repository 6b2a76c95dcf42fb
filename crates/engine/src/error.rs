//! Error types for the backend adapters
//!
//! Only the per-metric layers (orchestrator adapter, query engine) return
//! these. Assembled views convert every failure into a degraded value.

use thiserror::Error;

/// Failures talking to the container orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The named service, task or container does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The request exceeded the configured timeout
    #[error("orchestrator request timed out")]
    Timeout,

    /// Connection refused, DNS failure, reset, ...
    #[error("orchestrator transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Any other non-2xx response
    #[error("orchestrator returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape
    #[error("failed to decode orchestrator response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OrchestratorError::Timeout
        } else if err.is_decode() {
            OrchestratorError::Decode(err.to_string())
        } else {
            OrchestratorError::Transport(err)
        }
    }
}

/// Failures talking to the time-series backend
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("time-series query timed out")]
    Timeout,

    #[error("time-series transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("time-series backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered 2xx but reported `status: "error"`
    #[error("time-series backend error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("failed to decode time-series response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QueryError::Timeout
        } else if err.is_decode() {
            QueryError::Decode(err.to_string())
        } else {
            QueryError::Transport(err)
        }
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
pub type QueryResult<T> = std::result::Result<T, QueryError>;
