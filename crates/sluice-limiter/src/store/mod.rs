//! Shared counter stores
//!
//! Every operation on a [`CounterStore`] is one indivisible
//! read-modify-write per key. Implementations must not split the refill and
//! the take, or the window trim and the count, across separate round trips.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::key::CounterKey;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

/// Longest a bucket state is kept after its last update
pub const MAX_BUCKET_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// One token bucket take
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketRequest {
    /// Tokens per second
    pub rate: f64,
    pub capacity: f64,
    /// Current time in fractional epoch seconds
    pub now_secs: f64,
    pub requested: f64,
}

impl TokenBucketRequest {
    /// Seconds a bucket state outlives its last update: long enough to
    /// refill twice over, at least 1 and at most [`MAX_BUCKET_TTL_SECS`].
    pub fn ttl_secs(&self) -> u64 {
        let ttl = (2.0 * self.capacity / self.rate).ceil();
        if ttl.is_nan() || ttl < 1.0 {
            1
        } else if ttl >= MAX_BUCKET_TTL_SECS as f64 {
            MAX_BUCKET_TTL_SECS
        } else {
            ttl as u64
        }
    }

    /// Refill `tokens` (last refreshed at `last_refill`) up to capacity and
    /// take the requested amount if available. Returns `(allowed, tokens_left)`.
    pub fn apply(&self, tokens: f64, last_refill: f64) -> (bool, f64) {
        let elapsed = (self.now_secs - last_refill).max(0.0);
        let filled = (tokens + elapsed * self.rate).min(self.capacity);
        if filled >= self.requested {
            (true, filled - self.requested)
        } else {
            (false, filled)
        }
    }
}

/// One sliding window hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowRequest {
    pub window_ms: i64,
    pub limit: i64,
    /// Current time in epoch milliseconds
    pub now_ms: i64,
}

impl SlidingWindowRequest {
    /// Timestamps at or before this instant have left the window
    pub fn cutoff(&self) -> i64 {
        self.now_ms.saturating_sub(self.window_ms)
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Atomically refill and take from the bucket under `key`
    async fn take_token(
        &self,
        key: &CounterKey,
        request: TokenBucketRequest,
    ) -> Result<bool, StoreError>;

    /// Atomically trim, count and (if under limit) record a hit under `key`
    async fn record_hit(
        &self,
        key: &CounterKey,
        request: SlidingWindowRequest,
    ) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        let request = TokenBucketRequest {
            rate: 100.0,
            capacity: 1.0,
            now_secs: 0.0,
            requested: 1.0,
        };
        assert_eq!(request.ttl_secs(), 1);

        let request = TokenBucketRequest {
            rate: 5.0,
            capacity: 12.0,
            ..request
        };
        assert_eq!(request.ttl_secs(), 5);
    }

    #[test]
    fn ttl_is_capped_for_slow_refill() {
        let request = TokenBucketRequest {
            rate: 1e-16,
            capacity: 1.0,
            now_secs: 0.0,
            requested: 1.0,
        };
        assert_eq!(request.ttl_secs(), MAX_BUCKET_TTL_SECS);

        let request = TokenBucketRequest {
            rate: f64::MIN_POSITIVE,
            capacity: i64::MAX as f64,
            ..request
        };
        assert_eq!(request.ttl_secs(), MAX_BUCKET_TTL_SECS);
    }

    #[test]
    fn apply_refills_up_to_capacity() {
        let request = TokenBucketRequest {
            rate: 5.0,
            capacity: 10.0,
            now_secs: 100.0,
            requested: 1.0,
        };
        // Empty bucket, one second elapsed: five tokens back, one taken
        assert_eq!(request.apply(0.0, 99.0), (true, 4.0));
        // Long idle never exceeds capacity
        assert_eq!(request.apply(0.0, 0.0), (true, 9.0));
        // Clock going backwards does not drain the bucket
        assert_eq!(request.apply(0.5, 101.0), (false, 0.5));
    }
}
