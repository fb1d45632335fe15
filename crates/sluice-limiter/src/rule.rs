//! Rate rules
//!
//! Rules are immutable once loaded. A request is matched against the
//! ordered override list by exact path and method-or-wildcard; the first
//! match wins and everything else falls through to the default rule.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LimiterError;
use crate::store::MAX_BUCKET_TTL_SECS;

/// Fallback sliding-window limit when the configured one is not positive
pub const DEFAULT_WINDOW_LIMIT: i64 = 10;

/// Fallback window when the configured duration does not parse
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Counters are kept at millisecond resolution
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    TokenBucket,
    SlidingWindow,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

/// What a quota is shared by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyScope {
    #[default]
    #[serde(rename = "ip", alias = "per_ip")]
    PerIp,
    #[serde(rename = "user_id", alias = "per_identity")]
    PerIdentity,
    #[serde(rename = "global")]
    Global,
}

/// One admission rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateRule {
    pub path: String,
    /// Empty matches any method
    pub method: String,
    #[serde(alias = "algo")]
    pub algorithm: Algorithm,
    #[serde(alias = "key")]
    pub key_scope: KeyScope,
    /// Token bucket refill rate, tokens per second
    pub rate: f64,
    /// Token bucket capacity
    pub burst: i64,
    /// Sliding window admissions per window
    pub limit: i64,
    /// Sliding window size as a duration string ("1s", "500ms", "1m")
    pub window: String,
}

impl Default for RateRule {
    fn default() -> Self {
        Self {
            path: String::new(),
            method: String::new(),
            algorithm: Algorithm::TokenBucket,
            key_scope: KeyScope::PerIp,
            rate: 10.0,
            burst: 20,
            limit: DEFAULT_WINDOW_LIMIT,
            window: "1m".to_string(),
        }
    }
}

impl RateRule {
    pub fn token_bucket(path: impl Into<String>, rate: f64, burst: i64) -> Self {
        Self {
            path: path.into(),
            algorithm: Algorithm::TokenBucket,
            rate,
            burst,
            ..Self::default()
        }
    }

    pub fn sliding_window(path: impl Into<String>, limit: i64, window: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            algorithm: Algorithm::SlidingWindow,
            limit,
            window: window.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_scope(mut self, scope: KeyScope) -> Self {
        self.key_scope = scope;
        self
    }

    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.path == path && (self.method.is_empty() || self.method == method)
    }

    /// `(rate, capacity)` with non-positive values floored to 1
    pub fn bucket_params(&self) -> (f64, f64) {
        let rate = if self.rate > 0.0 { self.rate } else { 1.0 };
        let capacity = if self.burst > 0 { self.burst as f64 } else { 1.0 };
        (rate, capacity)
    }

    /// `(limit, window)` with the documented fallbacks applied
    pub fn window_params(&self) -> (i64, Duration) {
        let limit = if self.limit > 0 {
            self.limit
        } else {
            DEFAULT_WINDOW_LIMIT
        };
        (limit, self.parsed_window().unwrap_or(DEFAULT_WINDOW))
    }

    fn parsed_window(&self) -> Option<Duration> {
        humantime::parse_duration(self.window.trim())
            .ok()
            .filter(|d| *d >= MIN_WINDOW)
    }

    fn validate(&self, is_default: bool) -> Result<(), LimiterError> {
        let invalid = |reason: &str| LimiterError::InvalidRule {
            path: if is_default {
                "<default>".to_string()
            } else {
                self.path.clone()
            },
            reason: reason.to_string(),
        };
        if !is_default && self.path.is_empty() {
            return Err(invalid("path must not be empty"));
        }
        if !self.rate.is_finite() {
            return Err(invalid("rate must be a finite number"));
        }
        match self.algorithm {
            Algorithm::TokenBucket => {
                let (rate, capacity) = self.bucket_params();
                if 2.0 * capacity / rate > MAX_BUCKET_TTL_SECS as f64 {
                    return Err(invalid("rate is too slow to refill the bucket within 7 days"));
                }
            }
            Algorithm::SlidingWindow => {
                let window = self.window.trim();
                if !window.is_empty() {
                    match humantime::parse_duration(window) {
                        Err(_) => return Err(invalid("window is not a valid duration")),
                        Ok(d) if !d.is_zero() && d < MIN_WINDOW => {
                            return Err(invalid("window must be at least 1ms"))
                        }
                        Ok(_) => {}
                    }
                }
            }
        }
        Ok(())
    }
}

/// The loaded admission configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateRuleSet {
    pub enabled: bool,
    pub default: RateRule,
    pub rules: Vec<RateRule>,
}

impl Default for RateRuleSet {
    fn default() -> Self {
        Self::new(RateRule::default())
    }
}

impl RateRuleSet {
    pub fn new(default: RateRule) -> Self {
        Self {
            enabled: true,
            default,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: RateRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Exactly one rule per request: first specific match, else the default
    pub fn select(&self, path: &str, method: &str) -> &RateRule {
        self.rules
            .iter()
            .find(|rule| rule.matches(path, method))
            .unwrap_or(&self.default)
    }

    pub fn validate(&self) -> Result<(), LimiterError> {
        self.default.validate(true)?;
        for rule in &self.rules {
            rule.validate(false)?;
        }
        Ok(())
    }
}
