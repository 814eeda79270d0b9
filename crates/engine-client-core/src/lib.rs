//! # Engine Client Core
//!
//! Runtime-agnostic logic of the engine client: the task model, the
//! transport seam, single-shot task reads, signing-key resolution and tenant
//! token issuance.
//!
//! This crate contains no tokio, reqwest or timer dependencies. Polling
//! (which needs a clock) and the HTTP transport live in the `engine-client`
//! crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Error taxonomy |
//! | [`task`] | Task handles, snapshots, statuses, query filters |
//! | [`transport`] | `Transport` trait, requests, response mapping |
//! | [`fetch`] | Task snapshot fetcher and task housekeeping |
//! | [`keys`] | API keys and signing-key resolvers |
//! | [`token`] | Tenant token claims, signing and verification |
//! | [`memory`] | Scripted in-memory engine for tests |

pub mod error;
pub mod fetch;
pub mod keys;
pub mod memory;
pub mod task;
pub mod token;
pub mod transport;

pub use error::{ApiError, EngineError, Resource, Result};
pub use fetch::TaskFetcher;
pub use keys::{
    resolve_signing_key, DefaultAdminKey, Key, KeyByUid, KeyResolver, KeysPage, SigningKey,
    StaticKey,
};
pub use task::{
    require_succeeded, TaskErrorDetail, TaskHandle, TaskSnapshot, TaskStatus, TasksPage,
    TasksQuery,
};
pub use token::{
    issue_with_key, verify_tenant_token, SearchRules, TenantTokenClaims, TenantTokenIssuer,
    TokenOptions,
};
pub use transport::{Method, Request, Response, Transport};
