//! reqwest-backed [`Transport`].
//!
//! One `reqwest::Client` (and thus one connection pool) is shared by every
//! component of an [`EngineClient`](crate::client::EngineClient). Requests
//! carry `Authorization: Bearer <api_key>` when a key is configured.
//!
//! Non-2xx responses are returned as data, not errors; status mapping
//! happens in the core. Only connection-level failures become
//! [`EngineError::Transport`]. Nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use engine_client_core::{EngineError, Method, Request, Response, Result, Transport};

use crate::config::EngineConfig;

const USER_AGENT: &str = concat!("engine-client/", env!("CARGO_PKG_VERSION"));

/// HTTP transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Build a transport from engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(EngineError::transport)?;

        Ok(Self {
            client,
            base_url: config.host.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        let url = self.url_for(&request.path);

        let mut builder = self.client.request(to_reqwest(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            debug!(method = request.method.as_str(), %url, error = %e, "request failed");
            EngineError::transport(e)
        })?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(EngineError::transport)?;
        debug!(method = request.method.as_str(), %url, status, "engine responded");

        Ok(Response::new(status, body.to_vec()))
    }
}
