use serde::{Deserialize, Serialize};
use std::time::Duration;

use sluice_limiter::{RateRule, RateRuleSet};
use sluice_llm::{MockSettings, OpenAiSettings};
use sluice_observability::LoggingConfig;

/// Root of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub rate_limit: RateLimitConfig,
    pub llm: LlmConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            rate_limit: RateLimitConfig::default(),
            llm: LlmConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Override one scalar setting, as command line flags do
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["server", "host"] => self.server.host = value.to_string(),
            ["server", "port"] => {
                self.server.port = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid port number: {}", value))
                })?;
            }
            ["server", "cors"] => {
                self.server.cors = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            ["gateway", "path"] => self.gateway.path = value.to_string(),
            ["rate_limit", "enabled"] => {
                self.rate_limit.rules.enabled = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            ["rate_limit", "store", "url"] => self.rate_limit.store.url = value.to_string(),
            ["llm", "default_provider"] => self.llm.default_provider = value.to_string(),
            ["identity", "base_url"] => self.identity.base_url = value.to_string(),
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upgrade endpoint and per-connection limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub path: String,
    pub max_frame_bytes: usize,
    pub pong_wait_secs: u64,
    pub ping_period_secs: u64,
    pub write_wait_secs: u64,
    pub send_queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            path: "/chat".to_string(),
            max_frame_bytes: 512 * 1024,
            pong_wait_secs: 60,
            ping_period_secs: 54,
            write_wait_secs: 10,
            send_queue_capacity: 256,
        }
    }
}

impl GatewayConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// `enabled`, `default` and `rules` sit directly in this section
    #[serde(flatten)]
    pub rules: RateRuleSet,
    pub store: StoreConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rules: RateRuleSet::new(RateRule::default()),
            store: StoreConfig::default(),
        }
    }
}

/// Shared counter store. An empty `url` keeps counters in process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: 250,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub mock: MockSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiSettings>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "mock".to_string(),
            mock: MockSettings::default(),
            openai: None,
        }
    }
}

impl LlmConfig {
    /// Providers this configuration can build
    pub fn available_providers(&self) -> Vec<&'static str> {
        let mut names = vec!["mock"];
        if self.openai.is_some() {
            names.push("openai");
        }
        names
    }
}

/// Where credentials are verified
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
