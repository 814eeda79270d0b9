//! Error taxonomy for the engine client.
//!
//! Every failure a caller can observe maps to exactly one [`EngineError`]
//! variant, so "we gave up waiting" ([`EngineError::Timeout`]) is always
//! distinguishable from "the engine reported failure"
//! ([`EngineError::TaskFailed`]).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskErrorDetail;

/// Boxed error produced by a [`Transport`](crate::transport::Transport) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of engine resource a not-found error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Task,
    Key,
    Index,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Task => f.write_str("task"),
            Resource::Key => f.write_str("key"),
            Resource::Index => f.write_str("index"),
        }
    }
}

/// Error payload returned by the engine on non-2xx responses.
///
/// ```json
/// { "message": "Task `12` not found.", "code": "task_not_found",
///   "type": "invalid_request", "link": "https://docs..." }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub link: String,
}

impl ApiError {
    /// Build an error from a response body the engine did not shape as JSON.
    pub fn from_raw_body(body: &[u8]) -> Self {
        Self {
            message: String::from_utf8_lossy(body).chars().take(500).collect(),
            ..Default::default()
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

/// Every error the client surfaces.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network or connection failure. Never retried here.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The engine does not know the requested task or key.
    #[error("{resource} `{id}` not found")]
    NotFound { resource: Resource, id: String },

    /// Any other non-2xx response.
    #[error("engine returned HTTP {status}: {error}")]
    Api { status: u16, error: ApiError },

    /// A response (or request body) could not be (de)serialized.
    #[error("failed to decode engine payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The wait deadline elapsed before a terminal status was observed.
    #[error("timed out after {elapsed:?} waiting for task {task_uid}")]
    Timeout { task_uid: u64, elapsed: Duration },

    /// The caller aborted the wait.
    #[error("wait for task {task_uid} was canceled")]
    Canceled { task_uid: u64 },

    /// The task finished with status `failed`.
    #[error("task {task_uid} failed: {}", describe_detail(.detail))]
    TaskFailed {
        task_uid: u64,
        detail: Option<TaskErrorDetail>,
    },

    /// The task finished with status `canceled`.
    #[error("task {task_uid} was canceled{}", describe_canceled_by(.canceled_by))]
    TaskCanceled {
        task_uid: u64,
        canceled_by: Option<u64>,
    },

    #[error("search rules must contain at least one index rule: {0}")]
    InvalidSearchRules(String),

    #[error("api key uid `{requested}` does not match signing key uid `{resolved}`")]
    KeyMismatch { requested: String, resolved: String },

    #[error("token expiry {expires_at} is not in the future")]
    ExpiredToken { expires_at: DateTime<Utc> },

    #[error("no signing key available: {0}")]
    MissingKey(String),

    #[error("invalid tenant token: {0}")]
    InvalidToken(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        EngineError::Transport(err.into())
    }

    /// Whether this error means the wait was abandoned rather than the
    /// task having failed.
    pub fn is_abandoned_wait(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::Canceled { .. }
        )
    }
}

fn describe_detail(detail: &Option<TaskErrorDetail>) -> String {
    match detail {
        Some(d) => d.to_string(),
        None => "no error detail reported".to_string(),
    }
}

fn describe_canceled_by(canceled_by: &Option<u64>) -> String {
    match canceled_by {
        Some(uid) => format!(" by task {}", uid),
        None => String::new(),
    }
}

/// Result alias used across the client.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = EngineError::NotFound {
            resource: Resource::Task,
            id: "42".to_string(),
        };
        assert_eq!(err.to_string(), "task `42` not found");
    }

    #[test]
    fn test_task_failed_display_includes_code() {
        let err = EngineError::TaskFailed {
            task_uid: 7,
            detail: Some(TaskErrorDetail {
                message: "Index `movies` not found.".to_string(),
                code: "index_not_found".to_string(),
                error_type: "invalid_request".to_string(),
                link: String::new(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("task 7 failed"), "{}", msg);
        assert!(msg.contains("index_not_found"), "{}", msg);
    }

    #[test]
    fn test_abandoned_wait_kinds() {
        assert!(EngineError::Timeout {
            task_uid: 1,
            elapsed: Duration::from_secs(1)
        }
        .is_abandoned_wait());
        assert!(EngineError::Canceled { task_uid: 1 }.is_abandoned_wait());
        assert!(!EngineError::TaskFailed {
            task_uid: 1,
            detail: None
        }
        .is_abandoned_wait());
    }

    #[test]
    fn test_api_error_from_raw_body_truncates() {
        let body = vec![b'x'; 2000];
        let err = ApiError::from_raw_body(&body);
        assert_eq!(err.message.len(), 500);
        assert!(err.code.is_empty());
    }
}
