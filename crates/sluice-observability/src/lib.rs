//! Sluice Observability
//!
//! Structured logging and Prometheus metrics shared by every gateway crate.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{ObservabilityError, Result};
pub use logging::{LogManager, LoggingConfig};
pub use metrics::{AdmissionMetrics, MetricsCollector, RelayMetrics, SessionMetrics};

/// Convenience imports
pub mod prelude {
    pub use crate::{LogManager, MetricsCollector, Result};

    pub use tracing::{debug, error, info, instrument, trace, warn, Span};
}
