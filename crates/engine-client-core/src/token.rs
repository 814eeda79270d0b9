//! Tenant token issuance.
//!
//! A tenant token is a JWT signed with HMAC-SHA256 using the secret of an
//! API key. It restricts its bearer to the indexes (and filters) listed in
//! its search rules, optionally until an expiry:
//!
//! ```text
//! base64url({"alg":"HS256","typ":"JWT"})
//!   . base64url({"apiKeyUid":"…","searchRules":{…},"exp":1700000000})
//!   . base64url(HMAC-SHA256(secret, header "." payload))
//! ```
//!
//! Issuance is entirely local once a secret is known; the only possible
//! network call is the optional key lookup of the fallback
//! [`KeyResolver`]. Validation happens before any signing and fails closed:
//! no partially-built token is ever returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::{EngineError, Result};
use crate::keys::{resolve_signing_key, KeyResolver, SigningKey};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_ALGORITHM: &str = "HS256";

/// Index uid (or `*`) → restriction.
///
/// A restriction is either an empty object (whole index) or an object with a
/// `filter` expression. Keys serialize in sorted order, so identical rules
/// always produce identical payload bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchRules(BTreeMap<String, Value>);

impl SearchRules {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Allow searching `index` without restriction.
    pub fn allow(mut self, index: impl Into<String>) -> Self {
        self.0.insert(index.into(), Value::Object(Map::new()));
        self
    }

    /// Allow searching `index` with `filter` always applied.
    pub fn allow_filtered(mut self, index: impl Into<String>, filter: impl Into<String>) -> Self {
        let mut rule = Map::new();
        rule.insert("filter".to_string(), Value::String(filter.into()));
        self.0.insert(index.into(), Value::Object(rule));
        self
    }

    /// Insert an arbitrary rule object (e.g. a filter given as an array).
    pub fn insert(&mut self, index: impl Into<String>, rule: Value) {
        self.0.insert(index.into(), rule);
    }

    /// Build rules from a dynamic JSON value; must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(EngineError::InvalidSearchRules(format!(
                "expected an object of index rules, got {}",
                other
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: &str) -> Option<&Value> {
        self.0.get(index)
    }

    fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(EngineError::InvalidSearchRules(
                "no index rules given".to_string(),
            ));
        }
        for (index, rule) in &self.0 {
            if index.is_empty() {
                return Err(EngineError::InvalidSearchRules(
                    "index uid must not be empty".to_string(),
                ));
            }
            if !(rule.is_object() || rule.is_null()) {
                return Err(EngineError::InvalidSearchRules(format!(
                    "rule for `{}` must be an object or null",
                    index
                )));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SearchRules {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Payload embedded in a tenant token. Never contains the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantTokenClaims {
    pub api_key_uid: String,
    pub search_rules: SearchRules,
    /// Expiry as Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Per-call issuance options.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    /// Explicit signing key; when absent the issuer's resolver is asked.
    pub signing_key: Option<SigningKey>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenOptions {
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Mints tenant tokens.
///
/// Holds an optional fallback [`KeyResolver`] used when a call does not
/// carry an explicit signing key.
#[derive(Clone, Default)]
pub struct TenantTokenIssuer {
    fallback: Option<Arc<dyn KeyResolver>>,
}

impl TenantTokenIssuer {
    /// An issuer that only accepts explicit signing keys.
    pub fn new() -> Self {
        Self { fallback: None }
    }

    pub fn with_resolver(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            fallback: Some(resolver),
        }
    }

    /// Issue a token valid from now.
    pub async fn issue(
        &self,
        api_key_uid: &str,
        search_rules: SearchRules,
        options: TokenOptions,
    ) -> Result<String> {
        self.issue_at(api_key_uid, search_rules, options, Utc::now())
            .await
    }

    /// Issue a token as of `now`.
    ///
    /// # Errors
    ///
    /// Checked in this order, all before signing:
    /// - [`EngineError::InvalidSearchRules`]: empty or malformed rules.
    /// - [`EngineError::KeyMismatch`]: empty `api_key_uid`.
    /// - [`EngineError::ExpiredToken`]: `expires_at` not after `now`.
    /// - [`EngineError::MissingKey`]: no secret resolvable.
    /// - [`EngineError::KeyMismatch`]: resolved key belongs to another uid.
    pub async fn issue_at(
        &self,
        api_key_uid: &str,
        search_rules: SearchRules,
        options: TokenOptions,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = build_claims(api_key_uid, search_rules, options.expires_at, now)?;
        let key = resolve_signing_key(
            options.signing_key.as_ref(),
            self.fallback.as_deref(),
            api_key_uid,
        )
        .await?;
        check_key_uid(api_key_uid, &key)?;
        sign_claims(&claims, &key)
    }
}

/// Offline issuance with a known key; no resolver, no I/O.
pub fn issue_with_key(
    key: &SigningKey,
    api_key_uid: &str,
    search_rules: SearchRules,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<String> {
    let claims = build_claims(api_key_uid, search_rules, expires_at, now)?;
    if key.is_empty() {
        return Err(EngineError::MissingKey(
            "explicit signing secret is empty".to_string(),
        ));
    }
    check_key_uid(api_key_uid, key)?;
    sign_claims(&claims, key)
}

fn build_claims(
    api_key_uid: &str,
    search_rules: SearchRules,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<TenantTokenClaims> {
    search_rules.validate()?;

    if api_key_uid.is_empty() {
        return Err(EngineError::KeyMismatch {
            requested: String::new(),
            resolved: "<any>".to_string(),
        });
    }

    // `exp` is embedded in whole seconds; compare at that precision.
    if let Some(expires_at) = expires_at {
        if expires_at.timestamp() <= now.timestamp() {
            return Err(EngineError::ExpiredToken { expires_at });
        }
    }

    Ok(TenantTokenClaims {
        api_key_uid: api_key_uid.to_string(),
        search_rules,
        exp: expires_at.map(|ts| ts.timestamp()),
    })
}

fn check_key_uid(api_key_uid: &str, key: &SigningKey) -> Result<()> {
    match key.uid() {
        Some(uid) if uid != api_key_uid => Err(EngineError::KeyMismatch {
            requested: api_key_uid.to_string(),
            resolved: uid.to_string(),
        }),
        _ => Ok(()),
    }
}

fn sign_claims(claims: &TenantTokenClaims, key: &SigningKey) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&TokenHeader::hs256())?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header, payload);

    let mut mac =
        HmacSha256::new_from_slice(key.secret_bytes()).expect("HMAC can take key of any size");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify a token's signature with `secret` and return its claims.
///
/// Checks the shape, the `HS256` header and the MAC (constant-time). Does
/// not enforce `exp`; the engine does that at query time.
pub fn verify_tenant_token(token: &str, secret: &str) -> Result<TenantTokenClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(EngineError::InvalidToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }
    let (header_b64, payload_b64, sig_b64) = (parts[0], parts[1], parts[2]);

    let header: TokenHeader = serde_json::from_slice(&decode_segment(header_b64, "header")?)
        .map_err(|e| EngineError::InvalidToken(format!("header: {}", e)))?;
    if header.alg != TOKEN_ALGORITHM {
        return Err(EngineError::InvalidToken(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    let signature = decode_segment(sig_b64, "signature")?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| EngineError::InvalidToken("signature mismatch".to_string()))?;

    serde_json::from_slice(&decode_segment(payload_b64, "payload")?)
        .map_err(|e| EngineError::InvalidToken(format!("payload: {}", e)))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| EngineError::InvalidToken(format!("{} is not base64url: {}", what, e)))
}
