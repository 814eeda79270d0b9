//! High-level client.
//!
//! [`EngineClient`] bundles one shared [`Transport`] with the task fetcher,
//! the waiter and the token issuer:
//!
//! ```rust,no_run
//! use engine_client::{ClientConfig, EngineClient, SearchRules, TokenOptions};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::for_host("http://localhost:7700", Some("masterKey".into()));
//! let client = EngineClient::new(&config)?;
//!
//! let task = client
//!     .add_documents("movies", &[json!({"id": 1, "title": "Alien"})], None, None)
//!     .await?;
//! let done = client.wait_for_task(task.task_uid).await?;
//! println!("{} finished as {}", done.uid, done.status);
//!
//! let token = client
//!     .generate_tenant_token("admin-key-uid", SearchRules::new().allow("movies"), TokenOptions::default())
//!     .await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use engine_client_core::keys::{get_key, list_keys};
use engine_client_core::transport::{call, path_segment};
use engine_client_core::{
    require_succeeded, DefaultAdminKey, Key, KeyResolver, KeysPage, Request, Resource, Result,
    SearchRules, TaskFetcher, TaskHandle, TaskSnapshot, TasksPage, TasksQuery, TenantTokenIssuer,
    TokenOptions, Transport,
};

use crate::config::{ClientConfig, WaitConfig};
use crate::http::HttpTransport;
use crate::wait::{BatchWaitError, TaskWaiter, WaitOptions};

/// Client for one engine instance.
#[derive(Clone)]
pub struct EngineClient {
    transport: Arc<dyn Transport>,
    fetcher: TaskFetcher,
    waiter: TaskWaiter,
    issuer: TenantTokenIssuer,
    wait_defaults: WaitOptions,
}

impl EngineClient {
    /// Build a client over HTTP from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.engine)?);
        Ok(Self::with_transport(transport, &config.wait))
    }

    /// Build a client over any transport. The token issuer falls back to the
    /// engine's default admin key when no explicit key is passed.
    pub fn with_transport(transport: Arc<dyn Transport>, wait: &WaitConfig) -> Self {
        let resolver: Arc<dyn KeyResolver> = Arc::new(DefaultAdminKey::new(transport.clone()));
        let fetcher = TaskFetcher::new(transport.clone());
        Self {
            waiter: TaskWaiter::new(fetcher.clone()),
            fetcher,
            issuer: TenantTokenIssuer::with_resolver(resolver),
            transport,
            wait_defaults: wait.to_options(),
        }
    }

    /// Replace the signing-key fallback strategy.
    pub fn with_key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.issuer = TenantTokenIssuer::with_resolver(resolver);
        self
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn waiter(&self) -> &TaskWaiter {
        &self.waiter
    }

    // ── Mutating calls ──────────────────────────────────────────────

    /// Send any mutating request and decode the enqueued task.
    pub async fn submit(&self, request: Request) -> Result<TaskHandle> {
        let path = request.path.clone();
        let handle: TaskHandle = call(self.transport.as_ref(), request).await?;
        info!(task_uid = handle.task_uid, task_type = %handle.task_type, %path, "task enqueued");
        Ok(handle)
    }

    pub async fn create_index(
        &self,
        uid: &str,
        primary_key: Option<&str>,
        custom_metadata: Option<&str>,
    ) -> Result<TaskHandle> {
        let mut body = json!({ "uid": uid });
        if let Some(pk) = primary_key {
            body["primaryKey"] = Value::String(pk.to_string());
        }
        let request = Request::post("/indexes").with_body(body);
        self.submit(tag(request, custom_metadata)).await
    }

    pub async fn delete_index(&self, uid: &str, custom_metadata: Option<&str>) -> Result<TaskHandle> {
        let segment = path_segment(Resource::Index, uid)?;
        let request =
            Request::delete(format!("/indexes/{}", segment)).with_subject(Resource::Index, uid);
        self.submit(tag(request, custom_metadata)).await
    }

    /// Add or replace documents. `documents` are schema-less JSON objects.
    pub async fn add_documents(
        &self,
        index: &str,
        documents: &[Value],
        primary_key: Option<&str>,
        custom_metadata: Option<&str>,
    ) -> Result<TaskHandle> {
        let segment = path_segment(Resource::Index, index)?;
        let mut request = Request::post(format!("/indexes/{}/documents", segment))
            .with_body(Value::Array(documents.to_vec()));
        if let Some(pk) = primary_key {
            request = request.with_query("primaryKey", pk);
        }
        self.submit(tag(request, custom_metadata)).await
    }

    pub async fn update_settings(
        &self,
        index: &str,
        settings: Value,
        custom_metadata: Option<&str>,
    ) -> Result<TaskHandle> {
        let segment = path_segment(Resource::Index, index)?;
        let request =
            Request::patch(format!("/indexes/{}/settings", segment)).with_body(settings);
        self.submit(tag(request, custom_metadata)).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    pub async fn get_task(&self, task_uid: u64) -> Result<TaskSnapshot> {
        self.fetcher.fetch(task_uid).await
    }

    pub async fn get_tasks(&self, query: &TasksQuery) -> Result<TasksPage> {
        self.fetcher.list(query).await
    }

    pub async fn cancel_tasks(&self, query: &TasksQuery) -> Result<TaskHandle> {
        self.fetcher.cancel(query).await
    }

    pub async fn delete_tasks(&self, query: &TasksQuery) -> Result<TaskHandle> {
        self.fetcher.delete(query).await
    }

    /// Wait for a task using the configured `[wait]` defaults.
    pub async fn wait_for_task(&self, task_uid: u64) -> Result<TaskSnapshot> {
        self.waiter.wait(task_uid, &self.wait_defaults).await
    }

    pub async fn wait_for_task_with(
        &self,
        task_uid: u64,
        options: &WaitOptions,
    ) -> Result<TaskSnapshot> {
        self.waiter.wait(task_uid, options).await
    }

    /// Wait for tasks in order, requiring each to succeed.
    pub async fn wait_for_tasks(
        &self,
        task_uids: &[u64],
    ) -> std::result::Result<Vec<TaskSnapshot>, BatchWaitError> {
        self.waiter
            .wait_all(task_uids, &self.wait_defaults, require_succeeded)
            .await
    }

    pub async fn wait_for_tasks_with<F>(
        &self,
        task_uids: &[u64],
        options: &WaitOptions,
        assert: F,
    ) -> std::result::Result<Vec<TaskSnapshot>, BatchWaitError>
    where
        F: Fn(&TaskSnapshot) -> Result<()>,
    {
        self.waiter.wait_all(task_uids, options, assert).await
    }

    // ── Keys and tokens ─────────────────────────────────────────────

    pub async fn get_keys(&self, offset: u32, limit: u32) -> Result<KeysPage> {
        list_keys(self.transport.as_ref(), offset, limit).await
    }

    pub async fn get_key(&self, uid: &str) -> Result<Key> {
        get_key(self.transport.as_ref(), uid).await
    }

    /// Mint a tenant token. Without `options.signing_key` the configured
    /// resolver (default admin key lookup unless replaced) supplies the
    /// secret.
    pub async fn generate_tenant_token(
        &self,
        api_key_uid: &str,
        search_rules: SearchRules,
        options: TokenOptions,
    ) -> Result<String> {
        self.issuer.issue(api_key_uid, search_rules, options).await
    }
}

/// Attach the caller's opaque `customMetadata` string, echoed back in task
/// snapshots.
fn tag(request: Request, custom_metadata: Option<&str>) -> Request {
    match custom_metadata {
        Some(meta) => request.with_query("customMetadata", meta),
        None => request,
    }
}
