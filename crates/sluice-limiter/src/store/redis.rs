//! Redis-backed counter store
//!
//! Both algorithms run as server-side scripts so that each decision is one
//! atomic step on the Redis side, whatever the number of gateway instances.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use super::{CounterStore, SlidingWindowRequest, TokenBucketRequest};
use crate::error::StoreError;
use crate::key::CounterKey;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local ts_key = KEYS[2]
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local tokens = tonumber(redis.call("get", tokens_key))
if tokens == nil then
  tokens = capacity
end
local last = tonumber(redis.call("get", ts_key))
if last == nil then
  last = 0
end

local delta = math.max(0, now - last)
local filled = math.min(capacity, tokens + delta * rate)
local allowed = 0
if filled >= requested then
  filled = filled - requested
  allowed = 1
end

redis.call("setex", tokens_key, ttl, tostring(filled))
redis.call("setex", ts_key, ttl, tostring(now))
return allowed
"#;

const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local member = ARGV[4]

redis.call("zremrangebyscore", key, 0, now - window)
local count = redis.call("zcard", key)
if count < limit then
  redis.call("zadd", key, now, member)
  redis.call("pexpire", key, window)
  return 1
end
return 0
"#;

/// Counter store shared by every gateway instance pointing at the same Redis
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    token_bucket: Script,
    sliding_window: Script,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url, "connected to redis counter store");
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }
}

fn allowed_from_reply(reply: i64) -> Result<bool, StoreError> {
    match reply {
        1 => Ok(true),
        0 => Ok(false),
        other => Err(StoreError::Reply(format!("script returned {}", other))),
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn take_token(
        &self,
        key: &CounterKey,
        request: TokenBucketRequest,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .token_bucket
            .key(format!("{}:tokens", key))
            .key(format!("{}:ts", key))
            .arg(request.rate)
            .arg(request.capacity)
            .arg(request.now_secs)
            .arg(request.requested)
            .arg(request.ttl_secs())
            .invoke_async(&mut conn)
            .await?;
        allowed_from_reply(reply)
    }

    async fn record_hit(
        &self,
        key: &CounterKey,
        request: SlidingWindowRequest,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // Score is the timestamp; the member only has to be unique so that
        // two hits in the same millisecond both count.
        let member = format!("{}-{}", request.now_ms, uuid::Uuid::new_v4());
        let reply: i64 = self
            .sliding_window
            .key(key.as_str())
            .arg(request.window_ms)
            .arg(request.limit)
            .arg(request.now_ms)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        allowed_from_reply(reply)
    }
}
