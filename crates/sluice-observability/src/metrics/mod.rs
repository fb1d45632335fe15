//! Metrics
//!
//! Recorders are plain static helpers over the `metrics` facade; they are
//! no-ops until a [`MetricsCollector`] installs the Prometheus recorder.

use metrics::{describe_counter, describe_gauge, Unit};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

#[cfg(feature = "prometheus")]
use crate::error::ObservabilityError;
use crate::error::Result;

pub const SESSIONS_ACTIVE: &str = "sluice_sessions_active";
pub const SESSIONS_OPENED: &str = "sluice_sessions_opened_total";
pub const SESSIONS_CLOSED: &str = "sluice_sessions_closed_total";
pub const ADMISSION_DECISIONS: &str = "sluice_admission_decisions_total";
pub const RELAYS: &str = "sluice_relays_total";

/// Holds the process-wide Prometheus recorder
pub struct MetricsCollector {
    #[cfg(feature = "prometheus")]
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl MetricsCollector {
    /// Install the global recorder. Fails if one is already installed.
    #[cfg(feature = "prometheus")]
    pub fn install() -> Result<Self> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|e| {
            ObservabilityError::metrics(format!("failed to set global recorder: {}", e))
        })?;

        register_descriptions();
        tracing::info!(target: "sluice_observability", "metrics collector initialized");

        Ok(Self {
            handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    pub fn install() -> Result<Self> {
        register_descriptions();
        Ok(Self::disabled())
    }

    /// A collector that renders nothing; recorders stay no-ops
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "prometheus")]
            handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "prometheus")]
        {
            self.handle.is_some()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            false
        }
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.handle.as_ref().map(|h| h.render()).unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

fn register_descriptions() {
    describe_gauge!(SESSIONS_ACTIVE, Unit::Count, "Number of live sessions");
    describe_counter!(SESSIONS_OPENED, Unit::Count, "Sessions registered");
    describe_counter!(SESSIONS_CLOSED, Unit::Count, "Sessions unregistered");
    describe_counter!(
        ADMISSION_DECISIONS,
        Unit::Count,
        "Admission checks by algorithm and outcome (allowed, denied, fail_open)"
    );
    describe_counter!(
        RELAYS,
        Unit::Count,
        "Chat relays by outcome (started, completed, failed, cancelled)"
    );
}

pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_opened() {
        metrics::counter!(SESSIONS_OPENED).increment(1);
    }

    pub fn record_closed() {
        metrics::counter!(SESSIONS_CLOSED).increment(1);
    }

    pub fn set_active(count: usize) {
        metrics::gauge!(SESSIONS_ACTIVE).set(count as f64);
    }
}

/// Admission outcomes. `fail_open` is the signal that rate limiting is
/// currently not being enforced.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    pub fn record_allowed(algorithm: &'static str) {
        Self::record(algorithm, "allowed");
    }

    pub fn record_denied(algorithm: &'static str) {
        Self::record(algorithm, "denied");
    }

    pub fn record_fail_open(algorithm: &'static str) {
        Self::record(algorithm, "fail_open");
    }

    fn record(algorithm: &'static str, outcome: &'static str) {
        metrics::counter!(ADMISSION_DECISIONS, "algorithm" => algorithm, "outcome" => outcome)
            .increment(1);
    }
}

pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_started(provider: &str) {
        Self::record(provider, "started");
    }

    pub fn record_completed(provider: &str) {
        Self::record(provider, "completed");
    }

    pub fn record_failed(provider: &str) {
        Self::record(provider, "failed");
    }

    pub fn record_cancelled(provider: &str) {
        Self::record(provider, "cancelled");
    }

    fn record(provider: &str, outcome: &'static str) {
        metrics::counter!(RELAYS, "provider" => provider.to_string(), "outcome" => outcome)
            .increment(1);
    }
}
