//! Task snapshot reads and task housekeeping calls.
//!
//! [`TaskFetcher::fetch`] performs exactly one `GET /tasks/{uid}` per call.
//! It never retries, never caches, and returns transport and decode
//! failures untouched; the waiter in the root crate builds polling on top.

use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, Resource, Result};
use crate::task::{TaskHandle, TaskSnapshot, TasksPage, TasksQuery};
use crate::transport::{call, Request, Transport};

/// Reads task state from the engine.
#[derive(Clone)]
pub struct TaskFetcher {
    transport: Arc<dyn Transport>,
}

impl TaskFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Read the latest snapshot of one task.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the engine does not know the task.
    /// - [`EngineError::Transport`] / [`EngineError::Decode`] verbatim.
    pub async fn fetch(&self, task_uid: u64) -> Result<TaskSnapshot> {
        let request = Request::get(format!("/tasks/{}", task_uid))
            .with_subject(Resource::Task, task_uid.to_string());
        let snapshot: TaskSnapshot = call(self.transport.as_ref(), request).await?;
        debug!(task_uid, status = %snapshot.status, "fetched task snapshot");
        Ok(snapshot)
    }

    /// List tasks matching `query` (`GET /tasks`).
    pub async fn list(&self, query: &TasksQuery) -> Result<TasksPage> {
        let request = Request::get("/tasks").with_query_pairs(query.list_params());
        call(self.transport.as_ref(), request).await
    }

    /// Cancel every enqueued or processing task matching `query`.
    ///
    /// The cancellation itself runs as a task; the returned handle tracks it.
    pub async fn cancel(&self, query: &TasksQuery) -> Result<TaskHandle> {
        require_filters(query, "cancel")?;
        let request = Request::post("/tasks/cancel").with_query_pairs(query.filter_params());
        call(self.transport.as_ref(), request).await
    }

    /// Delete finished tasks matching `query` from the engine's history.
    pub async fn delete(&self, query: &TasksQuery) -> Result<TaskHandle> {
        require_filters(query, "delete")?;
        let request = Request::delete("/tasks").with_query_pairs(query.filter_params());
        call(self.transport.as_ref(), request).await
    }
}

fn require_filters(query: &TasksQuery, action: &str) -> Result<()> {
    if query.has_filters() {
        Ok(())
    } else {
        Err(EngineError::InvalidRequest(format!(
            "refusing to {} tasks without at least one filter",
            action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;
    use crate::task::TaskStatus;
    use crate::transport::Method;

    #[tokio::test]
    async fn test_fetch_returns_latest_snapshot() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.script_task(
            5,
            "indexCreation",
            &[TaskStatus::Enqueued, TaskStatus::Succeeded],
        );
        let fetcher = TaskFetcher::new(engine.clone());

        let first = fetcher.fetch(5).await.unwrap();
        assert_eq!(first.status, TaskStatus::Enqueued);
        let second = fetcher.fetch(5).await.unwrap();
        assert_eq!(second.status, TaskStatus::Succeeded);
        // Terminal state is sticky.
        let third = fetcher.fetch(5).await.unwrap();
        assert_eq!(third.status, TaskStatus::Succeeded);
        assert_eq!(engine.fetch_count(5), 3);
    }

    #[tokio::test]
    async fn test_fetch_unknown_task_is_not_found() {
        let engine = Arc::new(InMemoryEngine::new());
        let fetcher = TaskFetcher::new(engine);
        match fetcher.fetch(404).await {
            Err(EngineError::NotFound { resource, id }) => {
                assert_eq!(resource, Resource::Task);
                assert_eq!(id, "404");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_propagates_transport_failure() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.script_task(3, "indexDeletion", &[TaskStatus::Processing]);
        engine.fail_task_reads(3, "connection reset by peer");
        let fetcher = TaskFetcher::new(engine.clone());

        let err = fetcher.fetch(3).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert!(err.to_string().contains("connection reset by peer"));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.script_task(1, "indexCreation", &[TaskStatus::Succeeded]);
        engine.script_task(2, "settingsUpdate", &[TaskStatus::Processing]);
        let fetcher = TaskFetcher::new(engine.clone());

        let page = fetcher
            .list(&TasksQuery::new().with_statuses([TaskStatus::Processing]))
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].uid, 2);

        let sent = engine.requests();
        let last = sent.last().unwrap();
        assert_eq!(last.method, Method::Get);
        assert_eq!(last.path, "/tasks");
    }

    #[tokio::test]
    async fn test_delete_without_filters_is_rejected_locally() {
        let engine = Arc::new(InMemoryEngine::new());
        let fetcher = TaskFetcher::new(engine.clone());
        let err = fetcher.delete(&TasksQuery::new().with_limit(10)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_enqueues_cancelation_task() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.script_task(8, "documentAdditionOrUpdate", &[TaskStatus::Enqueued]);
        let fetcher = TaskFetcher::new(engine.clone());

        let handle = fetcher
            .cancel(&TasksQuery::new().with_uids([8]))
            .await
            .unwrap();
        assert_eq!(handle.task_type, "taskCancelation");
        assert_eq!(handle.status, TaskStatus::Enqueued);

        let sent = engine.requests();
        let last = sent.last().unwrap();
        assert_eq!(last.path, "/tasks/cancel");
        assert_eq!(last.query, vec![("uids".to_string(), "8".to_string())]);
    }
}
