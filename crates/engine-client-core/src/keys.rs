//! API keys and signing-key resolution.
//!
//! Tenant tokens are signed with the secret value of an API key. Callers
//! either hand the secret over explicitly ([`StaticKey`]) or pick a lookup
//! strategy that asks the engine for it:
//!
//! | Strategy | Lookup |
//! |----------|--------|
//! | [`StaticKey`] | none, the caller-supplied secret is used as-is |
//! | [`DefaultAdminKey`] | scans `GET /keys` for the key named `"Default Admin API Key"` |
//! | [`KeyByUid`] | `GET /keys/{uid}` for the uid the token is issued for |
//!
//! A strategy that finds nothing fails with [`EngineError::MissingKey`];
//! there is no unauthenticated fallback.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Resource, Result};
use crate::transport::{call, path_segment, Request, Transport};

/// Name the engine gives the administrative key it creates on first start.
pub const DEFAULT_ADMIN_KEY_NAME: &str = "Default Admin API Key";

/// An API key as listed by the engine.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub uid: String,
    /// Secret value. Redacted from `Debug` output.
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("uid", &self.uid)
            .field("key", &"<redacted>")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("actions", &self.actions)
            .field("indexes", &self.indexes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One page of `GET /keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysPage {
    pub results: Vec<Key>,
    pub offset: u32,
    pub limit: u32,
    pub total: u32,
}

/// List API keys (`GET /keys`).
pub async fn list_keys(transport: &dyn Transport, offset: u32, limit: u32) -> Result<KeysPage> {
    let request = Request::get("/keys")
        .with_query("offset", offset.to_string())
        .with_query("limit", limit.to_string());
    call(transport, request).await
}

/// Fetch one API key by uid (`GET /keys/{uid}`).
pub async fn get_key(transport: &dyn Transport, uid: &str) -> Result<Key> {
    let segment = path_segment(Resource::Key, uid)?;
    let request = Request::get(format!("/keys/{}", segment)).with_subject(Resource::Key, uid);
    call(transport, request).await
}

/// Secret used to sign tenant tokens, with the uid of the key it belongs to
/// when known.
///
/// The secret is never part of `Debug` output and never leaves the process
/// except as an HMAC input.
#[derive(Clone)]
pub struct SigningKey {
    uid: Option<String>,
    secret: String,
}

impl SigningKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            uid: None,
            secret: secret.into(),
        }
    }

    /// Attach the uid of the key the secret belongs to, enabling the
    /// uid match check at issuance.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub(crate) fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl From<Key> for SigningKey {
    fn from(key: Key) -> Self {
        SigningKey::new(key.key).with_uid(key.uid)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("uid", &self.uid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Strategy for finding the secret to sign a token with.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve the signing key for a token issued on behalf of `api_key_uid`.
    async fn resolve(&self, api_key_uid: &str) -> Result<SigningKey>;
}

/// Caller-supplied secret; performs no lookup.
#[derive(Debug, Clone)]
pub struct StaticKey {
    key: SigningKey,
}

impl StaticKey {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl KeyResolver for StaticKey {
    async fn resolve(&self, _api_key_uid: &str) -> Result<SigningKey> {
        if self.key.is_empty() {
            return Err(EngineError::MissingKey(
                "explicit signing secret is empty".to_string(),
            ));
        }
        Ok(self.key.clone())
    }
}

/// Looks up the engine's default administrative key by name.
pub struct DefaultAdminKey {
    transport: Arc<dyn Transport>,
    page_size: u32,
}

impl DefaultAdminKey {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl KeyResolver for DefaultAdminKey {
    async fn resolve(&self, _api_key_uid: &str) -> Result<SigningKey> {
        let mut offset = 0u32;
        loop {
            let page = list_keys(self.transport.as_ref(), offset, self.page_size).await?;
            let fetched = page.results.len() as u32;

            if let Some(key) = page
                .results
                .into_iter()
                .find(|k| k.name.as_deref() == Some(DEFAULT_ADMIN_KEY_NAME))
            {
                debug!(key_uid = %key.uid, "resolved default admin key");
                return Ok(SigningKey::from(key));
            }

            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }

        warn!("no key named {:?} in key listing", DEFAULT_ADMIN_KEY_NAME);
        Err(EngineError::MissingKey(format!(
            "no key named \"{}\" is visible to this client",
            DEFAULT_ADMIN_KEY_NAME
        )))
    }
}

/// Fetches the key whose uid the token is being issued for.
pub struct KeyByUid {
    transport: Arc<dyn Transport>,
}

impl KeyByUid {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl KeyResolver for KeyByUid {
    async fn resolve(&self, api_key_uid: &str) -> Result<SigningKey> {
        match get_key(self.transport.as_ref(), api_key_uid).await {
            Ok(key) => Ok(SigningKey::from(key)),
            Err(EngineError::NotFound { id, .. }) => {
                warn!(key_uid = %id, "signing key not found");
                Err(EngineError::MissingKey(format!(
                    "no key with uid `{}` is visible to this client",
                    id
                )))
            }
            Err(e) => Err(e),
        }
    }
}

/// Pick the signing key: the explicit one when given, otherwise the
/// fallback strategy, otherwise [`EngineError::MissingKey`].
pub async fn resolve_signing_key(
    explicit: Option<&SigningKey>,
    fallback: Option<&dyn KeyResolver>,
    api_key_uid: &str,
) -> Result<SigningKey> {
    match (explicit, fallback) {
        (Some(key), _) => StaticKey::new(key.clone()).resolve(api_key_uid).await,
        (None, Some(resolver)) => resolver.resolve(api_key_uid).await,
        (None, None) => Err(EngineError::MissingKey(
            "no explicit secret and no key resolver configured".to_string(),
        )),
    }
}
