//! # Engine Client
//!
//! Client library for a remote document-search engine.
//!
//! Every write the engine accepts (index creation, document additions,
//! settings updates, task cancelation) is processed asynchronously: the
//! engine answers with a task handle and the caller polls until the task is
//! terminal. Search access for end users is delegated through tenant tokens,
//! HS256 JWTs that embed per-index search rules and are signed with an
//! existing API key's secret.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐   submit    ┌──────────────┐
//!  │ EngineClient │────────────▶│  Transport   │──▶ engine (HTTP)
//!  └──────┬───────┘             │ http/memory  │
//!         │                     └──────▲───────┘
//!    ┌────┴─────┬───────────┐          │
//!    ▼          ▼           ▼          │
//! ┌──────┐  ┌────────┐  ┌────────┐     │
//! │ wait │─▶│ fetch  │  │ token  │─────┘ (key lookup)
//! └──────┘  └────────┘  └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engine_client::{config::load_config, logging::init_logging, EngineClient};
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! init_logging("engine_client=info");
//! let config = load_config(Path::new("engine.toml"))?;
//! let client = EngineClient::new(&config)?;
//! let task = client.create_index("movies", Some("id"), None).await?;
//! client.wait_for_task(task.task_uid).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | `EngineClient` facade |
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | reqwest transport |
//! | [`wait`] | Task waiter and batch waits |
//! | [`logging`] | Tracing subscriber setup |
//!
//! The task model, transport seam, key resolution and token issuance live in
//! [`engine_client_core`] and are re-exported here.

pub mod client;
pub mod config;
pub mod http;
pub mod logging;
pub mod wait;

pub use client::EngineClient;
pub use config::{load_config, ClientConfig, EngineConfig, WaitConfig};
pub use http::HttpTransport;
pub use wait::{BatchWaitError, TaskWaiter, WaitOptions, DEFAULT_POLL_INTERVAL};

pub use engine_client_core::{
    issue_with_key, require_succeeded, resolve_signing_key, verify_tenant_token, ApiError,
    DefaultAdminKey, EngineError, Key, KeyByUid, KeyResolver, KeysPage, Method, Request, Resource,
    Response, Result, SearchRules, SigningKey, StaticKey, TaskErrorDetail, TaskFetcher,
    TaskHandle, TaskSnapshot, TaskStatus, TasksPage, TasksQuery, TenantTokenClaims,
    TenantTokenIssuer, TokenOptions, Transport,
};
