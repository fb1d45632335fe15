//! Sluice Limiter - admission control in front of the gateway
//!
//! A request is mapped to exactly one [`RateRule`], turned into a
//! [`CounterKey`], and checked against a shared [`CounterStore`] with one of
//! two algorithms. Each store operation is a single atomic step, so
//! concurrent callers sharing a key cannot be double-admitted.

pub mod clock;
pub mod controller;
pub mod error;
pub mod key;
pub mod rule;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{AdmissionController, Decision, DEFAULT_STORE_TIMEOUT};
pub use error::{LimiterError, Result, StoreError};
pub use key::CounterKey;
pub use rule::{Algorithm, KeyScope, RateRule, RateRuleSet, MIN_WINDOW};
pub use store::memory::MemoryCounterStore;
#[cfg(feature = "redis")]
pub use store::redis::RedisCounterStore;
pub use store::{CounterStore, SlidingWindowRequest, TokenBucketRequest, MAX_BUCKET_TTL_SECS};
