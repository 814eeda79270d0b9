//! In-memory [`Transport`] implementation for tests and offline work.
//!
//! Emulates the subset of the engine API the client uses. Each task follows
//! a scripted status progression: every `GET /tasks/{uid}` advances one step
//! and the last status sticks. Mutating calls (`POST /indexes`, document
//! additions, settings updates, task cancelation/deletion) enqueue new tasks
//! that follow the default progression `enqueued → processing → succeeded`.
//!
//! Every request is recorded so tests can assert what went over the wire.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::error::{EngineError, Result};
use crate::keys::{Key, KeysPage};
use crate::task::{TaskErrorDetail, TaskHandle, TaskSnapshot, TaskStatus, TasksPage};
use crate::transport::{Method, Request, Response, Transport};

struct ScriptedTask {
    current: TaskSnapshot,
    pending: VecDeque<TaskStatus>,
}

impl ScriptedTask {
    fn advance(&mut self) {
        if let Some(next) = self.pending.pop_front() {
            apply_status(&mut self.current, next);
        }
    }
}

fn apply_status(snapshot: &mut TaskSnapshot, status: TaskStatus) {
    let now = Utc::now();
    snapshot.status = status;
    if status != TaskStatus::Enqueued && snapshot.started_at.is_none() {
        snapshot.started_at = Some(now);
    }
    if status.is_terminal() {
        snapshot.finished_at = Some(now);
    }
    if status == TaskStatus::Failed && snapshot.error.is_none() {
        snapshot.error = Some(TaskErrorDetail {
            message: format!("task {} failed", snapshot.uid),
            code: "internal".to_string(),
            error_type: "internal".to_string(),
            link: String::new(),
        });
    }
}

fn scripted_task(
    uid: u64,
    task_type: &str,
    index_uid: Option<String>,
    custom_metadata: Option<String>,
    statuses: &[TaskStatus],
) -> ScriptedTask {
    let mut pending: VecDeque<TaskStatus> = statuses.iter().copied().collect();
    let first = pending.front().copied().unwrap_or(TaskStatus::Enqueued);
    let mut current = TaskSnapshot {
        uid,
        batch_uid: None,
        index_uid,
        status: TaskStatus::Enqueued,
        task_type: task_type.to_string(),
        canceled_by: None,
        details: None,
        error: None,
        duration: None,
        enqueued_at: Utc::now(),
        started_at: None,
        finished_at: None,
        custom_metadata,
    };
    apply_status(&mut current, first);
    // The first read reports the first status again.
    if pending.is_empty() {
        pending.push_back(first);
    }
    ScriptedTask { current, pending }
}

/// Scripted engine fake.
pub struct InMemoryEngine {
    tasks: RwLock<BTreeMap<u64, ScriptedTask>>,
    keys: RwLock<Vec<Key>>,
    requests: RwLock<Vec<Request>>,
    broken_reads: RwLock<HashMap<u64, String>>,
    fetches: RwLock<HashMap<u64, usize>>,
    default_progression: RwLock<Vec<TaskStatus>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            keys: RwLock::new(Vec::new()),
            requests: RwLock::new(Vec::new()),
            broken_reads: RwLock::new(HashMap::new()),
            fetches: RwLock::new(HashMap::new()),
            default_progression: RwLock::new(vec![
                TaskStatus::Enqueued,
                TaskStatus::Processing,
                TaskStatus::Succeeded,
            ]),
        }
    }

    /// Register task `uid` with a status progression. The first status is
    /// visible immediately (to listings) and on the first read.
    pub fn script_task(&self, uid: u64, task_type: &str, statuses: &[TaskStatus]) {
        let task = scripted_task(uid, task_type, None, None, statuses);
        self.tasks.write().unwrap().insert(uid, task);
    }

    /// Progression used for tasks enqueued by mutating calls.
    pub fn set_default_progression(&self, statuses: &[TaskStatus]) {
        *self.default_progression.write().unwrap() = statuses.to_vec();
    }

    pub fn insert_key(&self, key: Key) {
        self.keys.write().unwrap().push(key);
    }

    /// Make every read of task `uid` fail at the transport level.
    pub fn fail_task_reads(&self, uid: u64, message: &str) {
        self.broken_reads
            .write()
            .unwrap()
            .insert(uid, message.to_string());
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.read().unwrap().clone()
    }

    /// Number of `GET /tasks/{uid}` calls received for `uid`.
    pub fn fetch_count(&self, uid: u64) -> usize {
        self.fetches.read().unwrap().get(&uid).copied().unwrap_or(0)
    }

    fn enqueue(&self, task_type: &str, index_uid: Option<String>, request: &Request) -> Result<Response> {
        let progression = self.default_progression.read().unwrap().clone();
        let custom_metadata = query_value(request, "customMetadata").map(str::to_string);

        // Uid allocation and insertion share one guard.
        let snapshot = {
            let mut tasks = self.tasks.write().unwrap();
            let uid = tasks.keys().next_back().map(|last| last + 1).unwrap_or(0);
            let task = scripted_task(uid, task_type, index_uid, custom_metadata, &progression);
            let snapshot = task.current.clone();
            tasks.insert(uid, task);
            snapshot
        };

        let handle = TaskHandle {
            task_uid: snapshot.uid,
            index_uid: snapshot.index_uid,
            status: TaskStatus::Enqueued,
            task_type: snapshot.task_type,
            enqueued_at: snapshot.enqueued_at,
        };
        Ok(Response::new(202, serde_json::to_vec(&handle)?))
    }

    fn read_task(&self, uid: u64) -> Result<Response> {
        *self.fetches.write().unwrap().entry(uid).or_insert(0) += 1;

        if let Some(message) = self.broken_reads.read().unwrap().get(&uid) {
            return Err(EngineError::transport(message.clone()));
        }

        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(&uid) {
            Some(task) => {
                task.advance();
                Ok(Response::new(200, serde_json::to_vec(&task.current)?))
            }
            None => Ok(not_found("task", &uid.to_string(), "task_not_found")),
        }
    }

    fn list_tasks(&self, request: &Request) -> Result<Response> {
        let statuses = query_list(request, "statuses");
        let uids = query_list(request, "uids");
        let types = query_list(request, "types");
        let index_uids = query_list(request, "indexUids");
        let limit: u32 = query_value(request, "limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let tasks = self.tasks.read().unwrap();
        let matching: Vec<TaskSnapshot> = tasks
            .values()
            .rev()
            .map(|t| t.current.clone())
            .filter(|s| statuses.is_empty() || statuses.iter().any(|v| v == s.status.as_str()))
            .filter(|s| uids.is_empty() || uids.iter().any(|v| *v == s.uid.to_string()))
            .filter(|s| types.is_empty() || types.iter().any(|v| *v == s.task_type))
            .filter(|s| {
                index_uids.is_empty()
                    || s.index_uid
                        .as_ref()
                        .map(|i| index_uids.iter().any(|v| v == i))
                        .unwrap_or(false)
            })
            .collect();

        let total = matching.len() as u64;
        let results: Vec<TaskSnapshot> = matching.into_iter().take(limit as usize).collect();
        let page = TasksPage {
            from: results.first().map(|s| s.uid),
            results,
            total: Some(total),
            limit,
            next: None,
        };
        Ok(Response::new(200, serde_json::to_vec(&page)?))
    }

    fn cancel_tasks(&self, request: &Request) -> Result<Response> {
        let targets = query_list(request, "uids");
        let response = self.enqueue("taskCancelation", None, request)?;
        let handle: TaskHandle = serde_json::from_slice(&response.body)?;

        let mut tasks = self.tasks.write().unwrap();
        for (uid, task) in tasks.iter_mut() {
            if *uid == handle.task_uid || task.current.status.is_terminal() {
                continue;
            }
            if targets.iter().any(|t| *t == uid.to_string()) {
                task.pending.clear();
                apply_status(&mut task.current, TaskStatus::Canceled);
                task.current.canceled_by = Some(handle.task_uid);
            }
        }
        Ok(response)
    }

    fn delete_tasks(&self, request: &Request) -> Result<Response> {
        let targets = query_list(request, "uids");
        self.tasks
            .write()
            .unwrap()
            .retain(|uid, task| {
                !(task.current.status.is_terminal() && targets.iter().any(|t| *t == uid.to_string()))
            });
        self.enqueue("taskDeletion", None, request)
    }

    fn list_keys(&self, request: &Request) -> Result<Response> {
        let offset: usize = query_value(request, "offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let limit: usize = query_value(request, "limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let keys = self.keys.read().unwrap();
        let page = KeysPage {
            results: keys.iter().skip(offset).take(limit).cloned().collect(),
            offset: offset as u32,
            limit: limit as u32,
            total: keys.len() as u32,
        };
        Ok(Response::new(200, serde_json::to_vec(&page)?))
    }

    fn read_key(&self, uid: &str) -> Result<Response> {
        let keys = self.keys.read().unwrap();
        match keys.iter().find(|k| k.uid == uid) {
            Some(key) => Ok(Response::new(200, serde_json::to_vec(key)?)),
            None => Ok(not_found("API key", uid, "api_key_not_found")),
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryEngine {
    async fn execute(&self, request: &Request) -> Result<Response> {
        self.requests.write().unwrap().push(request.clone());

        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["tasks"]) => self.list_tasks(request),
            (Method::Get, ["tasks", uid]) => match uid.parse::<u64>() {
                Ok(uid) => self.read_task(uid),
                Err(_) => Ok(bad_request("invalid task uid", "invalid_task_uid")),
            },
            (Method::Post, ["tasks", "cancel"]) => self.cancel_tasks(request),
            (Method::Delete, ["tasks"]) => self.delete_tasks(request),
            (Method::Get, ["keys"]) => self.list_keys(request),
            (Method::Get, ["keys", uid]) => self.read_key(uid),
            (Method::Post, ["indexes"]) => {
                let index_uid = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("uid"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.enqueue("indexCreation", index_uid, request)
            }
            (Method::Delete, ["indexes", index]) => {
                self.enqueue("indexDeletion", Some(index.to_string()), request)
            }
            (Method::Post, ["indexes", index, "documents"]) => {
                self.enqueue("documentAdditionOrUpdate", Some(index.to_string()), request)
            }
            (Method::Patch, ["indexes", index, "settings"]) => {
                self.enqueue("settingsUpdate", Some(index.to_string()), request)
            }
            _ => Ok(not_found("route", &request.path, "not_found")),
        }
    }
}

fn not_found(what: &str, id: &str, code: &str) -> Response {
    let body = json!({
        "message": format!("{} `{}` not found.", what, id),
        "code": code,
        "type": "invalid_request",
        "link": "",
    });
    Response::new(404, body.to_string())
}

fn bad_request(message: &str, code: &str) -> Response {
    let body = json!({
        "message": message,
        "code": code,
        "type": "invalid_request",
        "link": "",
    });
    Response::new(400, body.to_string())
}

fn query_value<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn query_list(request: &Request, name: &str) -> Vec<String> {
    query_value(request, name)
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}
