use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Owns the loaded configuration and the file it came from
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load `path`, writing a default file there first if it does not exist.
    /// The result is validated; an invalid file is an error.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            Self::read(path).await?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Self::validate(&config)?;

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Re-read the file; the current configuration is kept if the new one
    /// does not validate.
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let new_config = Self::read(&self.path).await?;
        Self::validate(&new_config)?;
        *self.config.write().await = new_config;

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    async fn read(path: &Path) -> ConfigResult<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("Server host cannot be empty".to_string()));
        }
        if config.server.port == 0 {
            return Err(ConfigError::Validation("Server port cannot be 0".to_string()));
        }

        let gateway = &config.gateway;
        if !gateway.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Gateway path must start with '/': {}",
                gateway.path
            )));
        }
        if gateway.ping_period_secs == 0 || gateway.ping_period_secs >= gateway.pong_wait_secs {
            return Err(ConfigError::Validation(
                "Gateway ping_period_secs must be non-zero and shorter than pong_wait_secs".to_string(),
            ));
        }
        if gateway.write_wait_secs == 0 {
            return Err(ConfigError::Validation(
                "Gateway write_wait_secs must be greater than 0".to_string(),
            ));
        }
        if gateway.send_queue_capacity == 0 || gateway.max_frame_bytes == 0 {
            return Err(ConfigError::Validation(
                "Gateway send_queue_capacity and max_frame_bytes must be greater than 0".to_string(),
            ));
        }

        config
            .rate_limit
            .rules
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if config.rate_limit.store.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Rate limit store timeout_ms must be greater than 0".to_string(),
            ));
        }

        let providers = config.llm.available_providers();
        if !providers.contains(&config.llm.default_provider.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Default LLM provider '{}' not found in providers list {:?}",
                config.llm.default_provider, providers
            )));
        }

        if config.identity.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Identity base_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid expansion pattern: {}", e)))?;

        let mut result = String::with_capacity(content.len());
        let mut last = 0;
        for cap in re.captures_iter(content) {
            let whole = cap.get(0).map(|m| m.range()).unwrap_or(0..0);
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match (std::env::var(var_name), default_value) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
            };

            result.push_str(&content[last..whole.start]);
            result.push_str(&replacement);
            last = whole.end;
        }
        result.push_str(&content[last..]);
        Ok(result)
    }
}
