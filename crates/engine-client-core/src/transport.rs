//! Transport abstraction.
//!
//! The [`Transport`] trait is the only way the core talks to the engine.
//! Connection pooling, TLS and compression belong to the implementation
//! (the root crate ships a reqwest-backed one); the core only builds
//! [`Request`]s and maps [`Response`]s through [`decode_response`].
//!
//! # Response mapping
//!
//! | Status | Result |
//! |--------|--------|
//! | `2xx` | body decoded as JSON |
//! | `404` on a request with a subject | [`EngineError::NotFound`] |
//! | anything else | [`EngineError::Api`] |

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, EngineError, Resource, Result};

/// HTTP verbs the engine API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A request against the engine, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path beginning with `/`, e.g. `/tasks/12`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Resource addressed by the path, used to turn a 404 into `NotFound`.
    pub subject: Option<(Resource, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            subject: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_subject(mut self, resource: Resource, id: impl Into<String>) -> Self {
        self.subject = Some((resource, id.into()));
        self
    }
}

/// Check a caller-supplied uid before it is spliced into a request path.
///
/// Index and key uids are limited to ASCII alphanumerics, `-` and `_`.
/// Anything else (`/`, `..`, `?`, `#`, whitespace) is rejected as
/// [`EngineError::InvalidRequest`] without sending anything.
pub fn path_segment(resource: Resource, value: &str) -> Result<&str> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(value)
    } else {
        Err(EngineError::InvalidRequest(format!(
            "invalid {} uid {:?}: only ASCII letters, digits, '-' and '_' are allowed",
            resource, value
        )))
    }
}

/// Raw engine response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes requests against the engine.
///
/// Implementations must be `Send + Sync`; one transport is shared by every
/// component of a client. Transport failures are returned as
/// [`EngineError::Transport`] and never retried by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response>;
}

/// Execute a request and decode its JSON response.
pub async fn call<T: DeserializeOwned>(transport: &dyn Transport, request: Request) -> Result<T> {
    let response = transport.execute(&request).await?;
    decode_response(&request, response)
}

/// Map a raw response to a decoded value or an error kind.
pub fn decode_response<T: DeserializeOwned>(request: &Request, response: Response) -> Result<T> {
    if response.is_success() {
        return Ok(serde_json::from_slice(&response.body)?);
    }

    if response.status == 404 {
        if let Some((resource, id)) = &request.subject {
            return Err(EngineError::NotFound {
                resource: *resource,
                id: id.clone(),
            });
        }
    }

    let error = serde_json::from_slice::<ApiError>(&response.body)
        .unwrap_or_else(|_| ApiError::from_raw_body(&response.body));
    Err(EngineError::Api {
        status: response.status,
        error,
    })
}
