use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CounterStore, SlidingWindowRequest, TokenBucketRequest};
use crate::error::StoreError;
use crate::key::CounterKey;

const PURGE_EVERY: u64 = 1024;

#[derive(Debug)]
enum Slot {
    Bucket {
        tokens: f64,
        last_refill: f64,
        expires_at_ms: i64,
    },
    Window {
        hits: VecDeque<i64>,
        expires_at_ms: i64,
    },
}

impl Slot {
    fn expires_at_ms(&self) -> i64 {
        match self {
            Slot::Bucket { expires_at_ms, .. } | Slot::Window { expires_at_ms, .. } => *expires_at_ms,
        }
    }
}

/// In-process counter store.
///
/// Each operation runs entirely under one lock, which is what makes it
/// atomic. Suitable for a single gateway instance and for tests; a
/// horizontally scaled deployment needs a shared store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    slots: Mutex<HashMap<String, Slot>>,
    ops: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, expired ones included until the next purge
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_purge(&self, slots: &mut HashMap<String, Slot>, now_ms: i64) {
        if self.ops.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            slots.retain(|_, slot| slot.expires_at_ms() > now_ms);
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn take_token(
        &self,
        key: &CounterKey,
        request: TokenBucketRequest,
    ) -> Result<bool, StoreError> {
        let now_ms = (request.now_secs * 1000.0) as i64;
        let mut slots = self.slots.lock();
        self.maybe_purge(&mut slots, now_ms);

        let (tokens, last_refill) = match slots.get(key.as_str()) {
            Some(Slot::Bucket {
                tokens,
                last_refill,
                expires_at_ms,
            }) if *expires_at_ms > now_ms => (*tokens, *last_refill),
            // Missing, expired, or held by the other algorithm: start full
            _ => (request.capacity, 0.0),
        };

        let (allowed, left) = request.apply(tokens, last_refill);
        let ttl_ms = (request.ttl_secs() as i64).saturating_mul(1000);
        slots.insert(
            key.as_str().to_string(),
            Slot::Bucket {
                tokens: left,
                last_refill: request.now_secs,
                expires_at_ms: now_ms.saturating_add(ttl_ms),
            },
        );
        Ok(allowed)
    }

    async fn record_hit(
        &self,
        key: &CounterKey,
        request: SlidingWindowRequest,
    ) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock();
        self.maybe_purge(&mut slots, request.now_ms);

        let slot = slots
            .entry(key.as_str().to_string())
            .and_modify(|slot| {
                if !matches!(slot, Slot::Window { .. }) || slot.expires_at_ms() <= request.now_ms {
                    *slot = Slot::Window {
                        hits: VecDeque::new(),
                        expires_at_ms: 0,
                    };
                }
            })
            .or_insert_with(|| Slot::Window {
                hits: VecDeque::new(),
                expires_at_ms: 0,
            });

        let Slot::Window {
            hits,
            expires_at_ms,
        } = slot
        else {
            return Err(StoreError::Reply(format!(
                "key {} does not hold a window",
                key
            )));
        };

        let cutoff = request.cutoff();
        while hits.front().is_some_and(|ts| *ts <= cutoff) {
            hits.pop_front();
        }

        if (hits.len() as i64) < request.limit {
            hits.push_back(request.now_ms);
            *expires_at_ms = request.now_ms.saturating_add(request.window_ms);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
