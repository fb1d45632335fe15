pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, GatewayConfig, IdentityConfig, LlmConfig, RateLimitConfig,
    ServerConfig, StoreConfig,
};
pub use manager::ConfigManager;
pub use sluice_observability::LoggingConfig;

use std::path::PathBuf;

/// `~/.sluice`
pub fn sluice_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".sluice"))
}

pub fn default_config_path() -> Option<PathBuf> {
    sluice_dir().map(|dir| dir.join("config.json"))
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
