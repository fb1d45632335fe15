//! Runtime reconfiguration
//!
//! Command line overrides are kept so they can be re-applied on top of every
//! reload. A reload (SIGHUP on unix) re-reads the config file and swaps the
//! log filter; other settings take effect on the next start.

use sluice_config::{Config, ConfigError, ConfigManager, ConfigResult};
use sluice_observability::LogManager;

use crate::error::ServerError;

/// Settings given on the command line, applied over the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub provider: Option<String>,
    /// Raw `key=value` pairs
    pub settings: Vec<String>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.port.is_none()
            && self.log_level.is_none()
            && self.provider.is_none()
            && self.settings.is_empty()
    }

    /// Apply every override to `config` and validate the result
    pub fn apply(&self, config: &mut Config) -> ConfigResult<()> {
        for setting in &self.settings {
            let (key, value) = setting.split_once('=').ok_or_else(|| {
                ConfigError::Validation(format!("expected key=value, got {:?}", setting))
            })?;
            config.set_value(key.trim(), value.trim())?;
        }
        if let Some(port) = self.port {
            config.set_value("server.port", &port.to_string())?;
        }
        if let Some(level) = &self.log_level {
            config.set_value("logging.level", level)?;
        }
        if let Some(provider) = &self.provider {
            config.set_value("llm.default_provider", provider)?;
        }
        ConfigManager::validate(config)
    }
}

/// Re-read the config file and apply its log level.
///
/// Returns the level now in effect. On error the previous configuration and
/// filter stay active.
pub async fn reload_logging(
    manager: &ConfigManager,
    overrides: &Overrides,
    logs: &mut LogManager,
) -> Result<String, ServerError> {
    manager.reload().await?;
    let mut config = manager.snapshot().await;
    overrides.apply(&mut config)?;

    if config.logging.level != logs.config().level {
        logs.update_level(&config.logging.level)?;
    }
    Ok(logs.config().level.clone())
}

/// Reload on every SIGHUP until the process exits
#[cfg(unix)]
pub async fn reload_on_hangup(manager: ConfigManager, overrides: Overrides, mut logs: LogManager) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP, runtime reload disabled");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        match reload_logging(&manager, &overrides, &mut logs).await {
            Ok(level) => tracing::info!(path = %manager.path().display(), level = %level, "config reloaded"),
            Err(e) => tracing::error!(error = %e, "config reload failed, keeping current settings"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_generic_settings() {
        let overrides = Overrides {
            port: Some(9100),
            log_level: Some("debug".into()),
            provider: None,
            settings: vec!["server.port=7000".into(), "server.host = 0.0.0.0".into()],
        };
        let mut config = Config::default();
        overrides.apply(&mut config).unwrap();
        assert_eq!(config.server.bind_address(), "0.0.0.0:9100");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut config = Config::default();
        let missing_equals = Overrides {
            settings: vec!["server.port".into()],
            ..Overrides::default()
        };
        assert!(matches!(
            missing_equals.apply(&mut config),
            Err(ConfigError::Validation(_))
        ));

        let unknown_provider = Overrides {
            provider: Some("openai".into()),
            ..Overrides::default()
        };
        assert!(unknown_provider.apply(&mut Config::default()).is_err());

        let unknown_key = Overrides {
            settings: vec!["server.colour=blue".into()],
            ..Overrides::default()
        };
        assert!(matches!(
            unknown_key.apply(&mut Config::default()),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert!(Overrides::default().is_empty());
    }
}
