//! Admission controller
//!
//! `check` never rejects because of infrastructure trouble: a store error or
//! a store round trip slower than the configured bound admits the request
//! and is reported through logs and the fail-open counter.

use std::sync::Arc;
use std::time::Duration;

use sluice_observability::AdmissionMetrics;

use crate::clock::{Clock, SystemClock};
use crate::error::LimiterError;
use crate::key::CounterKey;
use crate::rule::{Algorithm, RateRuleSet};
use crate::store::{CounterStore, SlidingWindowRequest, TokenBucketRequest};

/// Bound on one counter store round trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Outcome of one admission check
#[derive(Debug)]
pub enum Decision {
    Allowed,
    Denied,
    /// The store could not answer; the request is admitted anyway
    FailedOpen(LimiterError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied)
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    rules: Arc<RateRuleSet>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl AdmissionController {
    pub fn new(rules: RateRuleSet, store: Arc<dyn CounterStore>) -> Self {
        Self {
            rules: Arc::new(rules),
            store,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn rules(&self) -> &RateRuleSet {
        &self.rules
    }

    pub fn is_enabled(&self) -> bool {
        self.rules.enabled
    }

    /// Decide whether one request may proceed.
    ///
    /// `identity` is only consulted for rules scoped per identity.
    pub async fn check(
        &self,
        route: &str,
        method: &str,
        caller_ip: &str,
        identity: Option<&str>,
    ) -> Decision {
        if !self.rules.enabled {
            return Decision::Allowed;
        }

        let rule = self.rules.select(route, method);
        let key = CounterKey::build(rule, route, caller_ip, identity);
        let algorithm = rule.algorithm.as_str();

        let pending = async {
            match rule.algorithm {
                Algorithm::TokenBucket => {
                    let (rate, capacity) = rule.bucket_params();
                    let request = TokenBucketRequest {
                        rate,
                        capacity,
                        now_secs: self.clock.now_secs_f64(),
                        requested: 1.0,
                    };
                    self.store.take_token(&key, request).await
                }
                Algorithm::SlidingWindow => {
                    let (limit, window) = rule.window_params();
                    let request = SlidingWindowRequest {
                        window_ms: i64::try_from(window.as_millis())
                            .unwrap_or(i64::MAX)
                            .max(1),
                        limit,
                        now_ms: self.clock.now_millis(),
                    };
                    self.store.record_hit(&key, request).await
                }
            }
        };

        let outcome = match tokio::time::timeout(self.store_timeout, pending).await {
            Ok(Ok(allowed)) => Ok(allowed),
            Ok(Err(e)) => Err(LimiterError::Store(e)),
            Err(_) => Err(LimiterError::Timeout(self.store_timeout)),
        };

        match outcome {
            Ok(true) => {
                AdmissionMetrics::record_allowed(algorithm);
                Decision::Allowed
            }
            Ok(false) => {
                tracing::debug!(%key, route, method, "admission denied");
                AdmissionMetrics::record_denied(algorithm);
                Decision::Denied
            }
            Err(error) => {
                tracing::error!(
                    %key,
                    store = self.store.name(),
                    error = %error,
                    "rate limit store failure, failing open"
                );
                AdmissionMetrics::record_fail_open(algorithm);
                Decision::FailedOpen(error)
            }
        }
    }
}
