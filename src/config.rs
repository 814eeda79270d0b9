//! TOML configuration.
//!
//! ```toml
//! [engine]
//! host = "http://localhost:7700"
//! api_key = "masterKey"
//! timeout_secs = 30
//!
//! [wait]
//! poll_interval_ms = 50
//! timeout_ms = 5000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Deserialize, Clone)]
pub struct EngineConfig {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaitConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `0` disables the deadline.
    #[serde(default = "default_wait_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_wait_timeout_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}
fn default_wait_timeout_ms() -> u64 {
    5000
}

impl WaitConfig {
    pub fn to_options(&self) -> WaitOptions {
        let options = WaitOptions::new().poll_interval(Duration::from_millis(self.poll_interval_ms));
        if self.timeout_ms == 0 {
            options
        } else {
            options.timeout(Duration::from_millis(self.timeout_ms))
        }
    }
}

impl ClientConfig {
    /// Config for a host with default timeouts and wait settings.
    pub fn for_host(host: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            engine: EngineConfig {
                host: host.into(),
                api_key,
                timeout_secs: default_timeout_secs(),
            },
            wait: WaitConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let host = self.engine.host.trim();
        if host.is_empty() {
            anyhow::bail!("engine.host must not be empty");
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            anyhow::bail!(
                "engine.host must start with http:// or https://, got '{}'",
                host
            );
        }
        if self.engine.timeout_secs == 0 {
            anyhow::bail!("engine.timeout_secs must be > 0");
        }
        if let Some(key) = &self.engine.api_key {
            if key.is_empty() {
                anyhow::bail!("engine.api_key must not be empty when set");
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ClientConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.validate()?;
    Ok(config)
}
