//! Structured logging
//!
//! Installs a `tracing` registry with a reloadable filter so the level can be
//! changed while the gateway is running.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::error::{ObservabilityError, Result};

type ReloadHandle = Handle<EnvFilter, Registry>;

/// Logging section of the gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `sluice_gateway=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Per-module overrides appended to `level`
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: impl Into<String>) -> Self {
        self.module_levels.insert(module.into(), level.into());
        self
    }

    /// Build the filter this configuration describes
    pub fn build_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| ObservabilityError::logging(format!("invalid log level: {}", e)))?;

        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| ObservabilityError::logging(format!("invalid directive: {}", e)))?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }
}

/// Owns the global subscriber's reload handle
#[derive(Debug)]
pub struct LogManager {
    config: LoggingConfig,
    reload_handle: ReloadHandle,
}

impl LogManager {
    /// Install the global subscriber. Fails if one is already installed.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let filter = config.build_filter()?;
        let (filter, reload_handle) = reload::Layer::new(filter);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = if config.json {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_line_number(true);
            registry.with(layer).try_init()
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true);
            registry.with(layer).try_init()
        };
        installed.map_err(|e| ObservabilityError::logging(e.to_string()))?;

        tracing::info!(
            target: "sluice_observability",
            level = %config.level,
            json = config.json,
            "log manager initialized"
        );

        Ok(Self {
            config: config.clone(),
            reload_handle,
        })
    }

    /// Swap the active filter for `level`, keeping module overrides
    pub fn update_level(&mut self, level: &str) -> Result<()> {
        let next = self.config.clone().with_level(level);
        let filter = next.build_filter()?;
        self.reload_handle
            .modify(|current| *current = filter)
            .map_err(|e| ObservabilityError::logging(format!("failed to update log level: {}", e)))?;
        self.config = next;

        tracing::info!(target: "sluice_observability", level, "log level updated");
        Ok(())
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

/// Span carrying a session id, entered by both pumps of that session
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("session", session_id = %session_id)
}
