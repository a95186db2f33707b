use std::fmt;

use genqueue_core::{JobId, StoreError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque reference to a remote long-running operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic failure reported by the remote service on a finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One poll result. `progress_percent` is absent when the remote did not
/// report any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollResponse {
    pub done: bool,
    pub progress_percent: Option<f64>,
    pub error: Option<ErrorEnvelope>,
    pub result_reference: Option<String>,
}

impl PollResponse {
    pub fn running(progress_percent: Option<f64>) -> Self {
        Self {
            progress_percent,
            ..Self::default()
        }
    }

    pub fn finished(reference: impl Into<String>) -> Self {
        Self {
            done: true,
            progress_percent: Some(100.0),
            result_reference: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: ErrorEnvelope) -> Self {
        Self {
            done: true,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Errors surfaced by a [`crate::RemoteOperationClient`] and by the poll
/// loop around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("authorization error: {0}")]
    Auth(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("API error: {0}")]
    Operation(ErrorEnvelope),
    #[error("no download link was returned from the API")]
    MissingResult,
    #[error("cancelled")]
    Cancelled,
    #[error("sub-operation aborted: {0}")]
    Aborted(String),
}

/// Job-level failure; its `Display` is what ends up in `Job::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
    #[error("configuration error: API key not provided")]
    Configuration,
    #[error("invalid request: {0}")]
    InvalidRequest(ValidationError),
    #[error("output {}/{} failed: {source}", index + 1, total)]
    Aggregate {
        index: usize,
        total: usize,
        failed: usize,
        source: RemoteError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} is not FAILED and cannot be retried")]
    NotRetryable(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
