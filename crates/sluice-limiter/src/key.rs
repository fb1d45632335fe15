use std::fmt;

use crate::rule::{KeyScope, RateRule};

/// Identifies one independently tracked quota.
///
/// Format: `ratelimit:<algorithm>:<route>:<scope>[:<value>]`. Two requests
/// producing the same key share a quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    /// Build the key for a request.
    ///
    /// `PerIdentity` falls back to the caller IP when no identity is known.
    pub fn build(rule: &RateRule, route: &str, caller_ip: &str, identity: Option<&str>) -> Self {
        let algo = rule.algorithm.as_str();
        let identity = identity.filter(|id| !id.is_empty());
        let key = match (rule.key_scope, identity) {
            (KeyScope::Global, _) => format!("ratelimit:{}:{}:global", algo, route),
            (KeyScope::PerIdentity, Some(id)) => format!("ratelimit:{}:{}:user:{}", algo, route, id),
            (KeyScope::PerIdentity, None) | (KeyScope::PerIp, _) => {
                format!("ratelimit:{}:{}:ip:{}", algo, route, caller_ip)
            }
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
