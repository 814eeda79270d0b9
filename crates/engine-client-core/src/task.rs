//! Task data model.
//!
//! Mutating calls against the engine are executed asynchronously: the
//! engine answers immediately with a [`TaskHandle`] and the caller observes
//! progress by reading [`TaskSnapshot`]s until the status is terminal.
//!
//! ```text
//! enqueued ──▶ processing ──┬──▶ succeeded
//!     │                     ├──▶ failed
//!     └─────────────────────┴──▶ canceled
//! ```

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// `succeeded`, `failed` and `canceled` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Wire name, as used in query filters.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Processing => "processing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a mutating call: the task was accepted and queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub task_uid: u64,
    #[serde(default)]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub task_type: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Structured reason attached to a `failed` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub link: String,
}

impl fmt::Display for TaskErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// A point-in-time read of a task.
///
/// `details` is kept as a dynamic JSON value: its shape depends on the task
/// type and the client only inspects `status`, `uid` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub uid: u64,
    #[serde(default)]
    pub batch_uid: Option<u64>,
    #[serde(default)]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub canceled_by: Option<u64>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<TaskErrorDetail>,
    /// ISO 8601 duration reported by the engine (e.g. `"PT0.12S"`).
    #[serde(default)]
    pub duration: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_metadata: Option<String>,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The stock success assertion for batched waits.
///
/// Turns a terminal `failed` snapshot into [`EngineError::TaskFailed`] and a
/// `canceled` one into [`EngineError::TaskCanceled`]; everything else passes.
pub fn require_succeeded(snapshot: &TaskSnapshot) -> Result<()> {
    match snapshot.status {
        TaskStatus::Failed => Err(EngineError::TaskFailed {
            task_uid: snapshot.uid,
            detail: snapshot.error.clone(),
        }),
        TaskStatus::Canceled => Err(EngineError::TaskCanceled {
            task_uid: snapshot.uid,
            canceled_by: snapshot.canceled_by,
        }),
        _ => Ok(()),
    }
}

/// One page of `GET /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksPage {
    pub results: Vec<TaskSnapshot>,
    #[serde(default)]
    pub total: Option<u64>,
    pub limit: u32,
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub next: Option<u64>,
}

/// Filters for listing, canceling and deleting tasks.
///
/// Rendered as query parameters; list values are comma-joined and dates are
/// RFC 3339.
#[derive(Debug, Clone, Default)]
pub struct TasksQuery {
    pub uids: Vec<u64>,
    pub batch_uids: Vec<u64>,
    pub index_uids: Vec<String>,
    pub statuses: Vec<TaskStatus>,
    pub types: Vec<String>,
    pub canceled_by: Vec<u64>,
    pub before_enqueued_at: Option<DateTime<Utc>>,
    pub after_enqueued_at: Option<DateTime<Utc>>,
    pub before_started_at: Option<DateTime<Utc>>,
    pub after_started_at: Option<DateTime<Utc>>,
    pub before_finished_at: Option<DateTime<Utc>>,
    pub after_finished_at: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub from: Option<u64>,
    pub reverse: Option<bool>,
}

impl TasksQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uids(mut self, uids: impl IntoIterator<Item = u64>) -> Self {
        self.uids.extend(uids);
        self
    }

    pub fn with_index_uids<S: Into<String>>(mut self, index_uids: impl IntoIterator<Item = S>) -> Self {
        self.index_uids.extend(index_uids.into_iter().map(Into::into));
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_from(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    /// True when at least one filter (not pagination) is set.
    pub fn has_filters(&self) -> bool {
        !self.uids.is_empty()
            || !self.batch_uids.is_empty()
            || !self.index_uids.is_empty()
            || !self.statuses.is_empty()
            || !self.types.is_empty()
            || !self.canceled_by.is_empty()
            || self.before_enqueued_at.is_some()
            || self.after_enqueued_at.is_some()
            || self.before_started_at.is_some()
            || self.after_started_at.is_some()
            || self.before_finished_at.is_some()
            || self.after_finished_at.is_some()
    }

    /// Filter parameters only.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        push_list(&mut params, "uids", &self.uids);
        push_list(&mut params, "batchUids", &self.batch_uids);
        push_list(&mut params, "indexUids", &self.index_uids);
        push_list(&mut params, "statuses", &self.statuses);
        push_list(&mut params, "types", &self.types);
        push_list(&mut params, "canceledBy", &self.canceled_by);
        push_date(&mut params, "beforeEnqueuedAt", self.before_enqueued_at);
        push_date(&mut params, "afterEnqueuedAt", self.after_enqueued_at);
        push_date(&mut params, "beforeStartedAt", self.before_started_at);
        push_date(&mut params, "afterStartedAt", self.after_started_at);
        push_date(&mut params, "beforeFinishedAt", self.before_finished_at);
        push_date(&mut params, "afterFinishedAt", self.after_finished_at);
        params
    }

    /// Filter parameters plus pagination, for listing.
    pub fn list_params(&self) -> Vec<(String, String)> {
        let mut params = self.filter_params();
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(from) = self.from {
            params.push(("from".to_string(), from.to_string()));
        }
        if let Some(reverse) = self.reverse {
            params.push(("reverse".to_string(), reverse.to_string()));
        }
        params
    }
}

fn push_list<T: fmt::Display>(params: &mut Vec<(String, String)>, name: &str, values: &[T]) {
    if values.is_empty() {
        return;
    }
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    params.push((name.to_string(), joined));
}

fn push_date(params: &mut Vec<(String, String)>, name: &str, value: Option<DateTime<Utc>>) {
    if let Some(ts) = value {
        params.push((
            name.to_string(),
            ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
}
