//! End-to-end tests against a mock engine served over real HTTP.
//!
//! The mock speaks the subset of the engine API the client uses: tasks
//! advance one status per read, document batches containing `"fail": true`
//! end up `failed`, and the index named `stuck` never leaves `enqueued`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use engine_client::config::load_config;
use engine_client::{
    verify_tenant_token, ClientConfig, EngineClient, EngineError, Request, Resource, SearchRules,
    TaskStatus, TokenOptions, WaitOptions,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const MASTER_KEY: &str = "masterKey";
const ADMIN_SECRET: &str = "admin-secret-0123456789";

// ─── Mock engine ────────────────────────────────────────────────────

struct MockTask {
    index_uid: Option<String>,
    task_type: &'static str,
    status: &'static str,
    pending: VecDeque<&'static str>,
    custom_metadata: Option<String>,
}

#[derive(Default)]
struct MockEngine {
    tasks: Mutex<HashMap<u64, MockTask>>,
    next_uid: Mutex<u64>,
}

type Reply = (StatusCode, Json<Value>);

impl MockEngine {
    fn enqueue(
        &self,
        index_uid: Option<String>,
        task_type: &'static str,
        progression: &[&'static str],
        custom_metadata: Option<String>,
    ) -> Reply {
        let uid = {
            let mut next = self.next_uid.lock().unwrap();
            let uid = *next;
            *next += 1;
            uid
        };
        self.tasks.lock().unwrap().insert(
            uid,
            MockTask {
                index_uid: index_uid.clone(),
                task_type,
                status: "enqueued",
                pending: progression.iter().copied().collect(),
                custom_metadata,
            },
        );
        (
            StatusCode::ACCEPTED,
            Json(json!({
                "taskUid": uid,
                "indexUid": index_uid,
                "status": "enqueued",
                "type": task_type,
                "enqueuedAt": "2026-10-18T09:00:00Z",
            })),
        )
    }
}

fn task_json(uid: u64, task: &MockTask) -> Value {
    let terminal = matches!(task.status, "succeeded" | "failed" | "canceled");
    let error = if task.status == "failed" {
        json!({
            "message": "Document identifier `-1` is invalid.",
            "code": "invalid_document_id",
            "type": "invalid_request",
            "link": "",
        })
    } else {
        Value::Null
    };
    json!({
        "uid": uid,
        "batchUid": if task.status == "enqueued" { Value::Null } else { json!(uid) },
        "indexUid": task.index_uid,
        "status": task.status,
        "type": task.task_type,
        "canceledBy": null,
        "details": {},
        "error": error,
        "duration": if terminal { json!("PT0.012S") } else { Value::Null },
        "enqueuedAt": "2026-10-18T09:00:00Z",
        "startedAt": if task.status == "enqueued" { Value::Null } else { json!("2026-10-18T09:00:01Z") },
        "finishedAt": if terminal { json!("2026-10-18T09:00:02Z") } else { Value::Null },
        "customMetadata": task.custom_metadata,
    })
}

fn api_error(status: StatusCode, message: &str, code: &str, error_type: &str) -> Reply {
    (
        status,
        Json(json!({
            "message": message,
            "code": code,
            "type": error_type,
            "link": "",
        })),
    )
}

fn authorize(headers: &HeaderMap) -> Result<(), Reply> {
    let expected = format!("Bearer {}", MASTER_KEY);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(api_error(
            StatusCode::FORBIDDEN,
            "The provided API key is invalid.",
            "invalid_api_key",
            "auth",
        )),
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "available"}))
}

async fn get_task(
    State(engine): State<Arc<MockEngine>>,
    headers: HeaderMap,
    Path(uid): Path<u64>,
) -> Result<Reply, Reply> {
    authorize(&headers)?;
    let mut tasks = engine.tasks.lock().unwrap();
    match tasks.get_mut(&uid) {
        Some(task) => {
            if let Some(next) = task.pending.pop_front() {
                task.status = next;
            }
            Ok((StatusCode::OK, Json(task_json(uid, task))))
        }
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            &format!("Task `{}` not found.", uid),
            "task_not_found",
            "invalid_request",
        )),
    }
}

async fn create_index(
    State(engine): State<Arc<MockEngine>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Reply, Reply> {
    authorize(&headers)?;
    let uid = body["uid"].as_str().unwrap_or_default().to_string();
    let progression: &[&'static str] = if uid == "stuck" {
        &["enqueued"]
    } else {
        &["processing", "succeeded"]
    };
    Ok(engine.enqueue(
        Some(uid),
        "indexCreation",
        progression,
        query.get("customMetadata").cloned(),
    ))
}

async fn add_documents(
    State(engine): State<Arc<MockEngine>>,
    headers: HeaderMap,
    Path(index): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(documents): Json<Vec<Value>>,
) -> Result<Reply, Reply> {
    authorize(&headers)?;
    let failing = documents.iter().any(|d| d["fail"] == json!(true));
    let progression: &[&'static str] = if failing {
        &["processing", "failed"]
    } else {
        &["enqueued", "processing", "succeeded"]
    };
    Ok(engine.enqueue(
        Some(index),
        "documentAdditionOrUpdate",
        progression,
        query.get("customMetadata").cloned(),
    ))
}

async fn list_keys(headers: HeaderMap) -> Result<Reply, Reply> {
    authorize(&headers)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "results": [
                {
                    "uid": "search-uid",
                    "key": "search-secret",
                    "name": "Default Search API Key",
                    "description": "Use it to search from the frontend",
                    "actions": ["search"],
                    "indexes": ["*"],
                    "expiresAt": null,
                    "createdAt": "2026-01-01T00:00:00Z",
                    "updatedAt": "2026-01-01T00:00:00Z",
                },
                {
                    "uid": "admin-uid",
                    "key": ADMIN_SECRET,
                    "name": "Default Admin API Key",
                    "description": "Use it for anything that is not a search operation.",
                    "actions": ["*"],
                    "indexes": ["*"],
                    "expiresAt": null,
                    "createdAt": "2026-01-01T00:00:00Z",
                    "updatedAt": "2026-01-01T00:00:00Z",
                },
            ],
            "offset": 0,
            "limit": 20,
            "total": 2,
        })),
    ))
}

// ─── Helpers ────────────────────────────────────────────────────────

async fn start_mock_engine() -> String {
    let engine = Arc::new(MockEngine::default());
    let app = Router::new()
        .route("/health", get(health))
        .route("/tasks/{uid}", get(get_task))
        .route("/indexes", post(create_index))
        .route("/indexes/{index}/documents", post(add_documents))
        .route("/keys", get(list_keys))
        .with_state(engine);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("http://{}", addr);
    wait_for_server(&url).await;
    url
}

async fn wait_for_server(url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{}/health", url)).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Mock engine did not become ready within 5 seconds");
}

fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::for_host(url, Some(MASTER_KEY.to_string()));
    config.wait.poll_interval_ms = 10;
    config.wait.timeout_ms = 5000;
    config
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_document_task_waited_over_http() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let handle = client
        .add_documents(
            "movies",
            &[json!({"id": 1, "title": "Alien"}), json!({"id": 2, "title": "Heat"})],
            Some("id"),
            Some("import-42"),
        )
        .await
        .unwrap();
    assert_eq!(handle.status, TaskStatus::Enqueued);
    assert_eq!(handle.index_uid.as_deref(), Some("movies"));

    let snapshot = client.wait_for_task(handle.task_uid).await.unwrap();
    assert_eq!(snapshot.uid, handle.task_uid);
    assert_eq!(snapshot.status, TaskStatus::Succeeded);
    assert_eq!(snapshot.custom_metadata.as_deref(), Some("import-42"));
    assert_eq!(snapshot.duration.as_deref(), Some("PT0.012S"));
    assert!(snapshot.finished_at.is_some());
}

#[tokio::test]
async fn test_missing_task_is_not_found() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let err = client.get_task(999).await.unwrap_err();
    match err {
        EngineError::NotFound { resource, id } => {
            assert_eq!(resource, Resource::Task);
            assert_eq!(id, "999");
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_api_key_is_api_error() {
    let url = start_mock_engine().await;
    let config = ClientConfig::for_host(url.as_str(), Some("wrong-key".to_string()));
    let client = EngineClient::new(&config).unwrap();

    let err = client.get_task(0).await.unwrap_err();
    match err {
        EngineError::Api { status, error } => {
            assert_eq!(status, 403);
            assert_eq!(error.code, "invalid_api_key");
            assert_eq!(error.error_type, "auth");
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_stops_at_failed_task() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let mut uids = Vec::new();
    for batch in [
        vec![json!({"id": 1})],
        vec![json!({"id": -1, "fail": true})],
        vec![json!({"id": 3})],
    ] {
        let handle = client.add_documents("movies", &batch, None, None).await.unwrap();
        uids.push(handle.task_uid);
    }

    let err = client.wait_for_tasks(&uids).await.unwrap_err();
    assert_eq!(err.task_uid, uids[1]);
    assert_eq!(err.position, 1);
    match err.error {
        EngineError::TaskFailed { task_uid, detail } => {
            assert_eq!(task_uid, uids[1]);
            assert_eq!(detail.unwrap().code, "invalid_document_id");
        }
        other => panic!("expected TaskFailed, got {:?}", other),
    }

    // The third task was never polled, so its first read is still `enqueued`.
    let third = client.get_task(uids[2]).await.unwrap();
    assert_eq!(third.status, TaskStatus::Enqueued);
}

#[tokio::test]
async fn test_wait_times_out_on_stuck_task() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let handle = client.create_index("stuck", None, None).await.unwrap();
    let options = WaitOptions::new()
        .poll_interval(Duration::from_millis(20))
        .timeout(Duration::from_millis(200));
    let err = client
        .wait_for_task_with(handle.task_uid, &options)
        .await
        .unwrap_err();
    match err {
        EngineError::Timeout { task_uid, elapsed } => {
            assert_eq!(task_uid, handle.task_uid);
            assert!(elapsed >= Duration::from_millis(200));
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wait_canceled_by_token() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let handle = client.create_index("stuck", None, None).await.unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let options = WaitOptions::new()
        .poll_interval(Duration::from_millis(20))
        .cancel_on(token);
    let err = client
        .wait_for_task_with(handle.task_uid, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Canceled { task_uid } if task_uid == handle.task_uid));
    assert!(err.is_abandoned_wait());
}

#[tokio::test]
async fn test_tenant_token_signed_with_default_admin_key() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let expires_at = Utc::now() + ChronoDuration::hours(1);
    let rules = SearchRules::new()
        .allow_filtered("movies", "genre = comedy")
        .allow("books");
    let token = client
        .generate_tenant_token(
            "admin-uid",
            rules.clone(),
            TokenOptions::default().expires_at(expires_at),
        )
        .await
        .unwrap();

    let claims = verify_tenant_token(&token, ADMIN_SECRET).unwrap();
    assert_eq!(claims.api_key_uid, "admin-uid");
    assert_eq!(claims.search_rules, rules);
    assert_eq!(claims.exp, Some(expires_at.timestamp()));

    assert!(verify_tenant_token(&token, "search-secret").is_err());
}

#[tokio::test]
async fn test_tenant_token_for_other_key_is_mismatch() {
    let url = start_mock_engine().await;
    let client = EngineClient::new(&test_config(&url)).unwrap();

    let err = client
        .generate_tenant_token("search-uid", SearchRules::new().allow("*"), TokenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyMismatch { .. }));
}

#[tokio::test]
async fn test_expired_token_rejected_before_key_lookup() {
    // Unreachable host: any network call would surface as a transport error.
    let config = ClientConfig::for_host("http://127.0.0.1:9", Some(MASTER_KEY.to_string()));
    let client = EngineClient::new(&config).unwrap();
    let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

    let err = client
        .generate_tenant_token(
            "admin-uid",
            SearchRules::new().allow("movies"),
            TokenOptions::default().expires_at(past),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExpiredToken { .. }));
}

#[tokio::test]
async fn test_client_from_config_file() {
    let url = start_mock_engine().await;
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("engine.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[engine]
host = "{}/"
api_key = "{}"
timeout_secs = 5

[wait]
poll_interval_ms = 10
timeout_ms = 3000
"#,
            url, MASTER_KEY
        ),
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    let client = EngineClient::new(&config).unwrap();

    let handle = client
        .submit(
            Request::post("/indexes")
                .with_query("customMetadata", "from-config")
                .with_body(json!({"uid": "books"})),
        )
        .await
        .unwrap();
    let snapshot = client.wait_for_task(handle.task_uid).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Succeeded);
    assert_eq!(snapshot.index_uid.as_deref(), Some("books"));
    assert_eq!(snapshot.custom_metadata.as_deref(), Some("from-config"));
}
