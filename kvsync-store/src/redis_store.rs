//! Redis sync store
//!
//! Plain commands go through `AsyncCommands`; every conditional
//! read-then-write is a Lua script so that it runs atomically on the server.
//! Requires the `redis` feature.

use crate::config::RedisConfig;
use crate::error::{StoreError, StoreResult};
use crate::pool::{RedisConnection, RedisPool, RedisPoolBuilder};
use crate::store::{FieldAcquire, SyncStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const DECREMENT_IF_AT_LEAST: &str = r#"
    local value = tonumber(redis.call("get", KEYS[1]) or "0")
    local amount = tonumber(ARGV[1])
    if value >= amount then
        redis.call("decrby", KEYS[1], amount)
        return 1
    end
    return 0
"#;

const DECREMENT_IF_POSITIVE: &str = r#"
    local value = tonumber(redis.call("get", KEYS[1]) or "0")
    if value > 0 then
        return redis.call("decr", KEYS[1])
    end
    return false
"#;

const DRAIN: &str = r#"
    local value = tonumber(redis.call("get", KEYS[1]) or "0")
    if value == 0 then
        return 0
    end
    redis.call("set", KEYS[1], 0)
    return value
"#;

// KEYS[2] is only present when ARGV[4] == "1"
const ACQUIRE_FIELD: &str = r#"
    if ARGV[4] == "1" and redis.call("exists", KEYS[2]) == 1 then
        return 0
    end
    if ARGV[3] == "1" then
        local fields = redis.call("hkeys", KEYS[1])
        for _, field in ipairs(fields) do
            if field ~= ARGV[1] then
                return 0
            end
        end
    end
    redis.call("hincrby", KEYS[1], ARGV[1], 1)
    redis.call("expire", KEYS[1], ARGV[2])
    return 1
"#;

const RELEASE_FIELD: &str = r#"
    if redis.call("hexists", KEYS[1], ARGV[1]) == 0 then
        return {0, 0}
    end
    local remaining = redis.call("hincrby", KEYS[1], ARGV[1], -1)
    if remaining <= 0 then
        redis.call("hdel", KEYS[1], ARGV[1])
    end
    if redis.call("hlen", KEYS[1]) == 0 then
        redis.call("del", KEYS[1])
    end
    return {1, remaining}
"#;

/// Scripts are hashed once; `invoke_async` falls back from EVALSHA to EVAL
/// when the server has not cached them yet.
struct Scripts {
    compare_and_delete: redis::Script,
    decrement_if_at_least: redis::Script,
    decrement_if_positive: redis::Script,
    drain: redis::Script,
    acquire_field: redis::Script,
    release_field: redis::Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
            decrement_if_at_least: redis::Script::new(DECREMENT_IF_AT_LEAST),
            decrement_if_positive: redis::Script::new(DECREMENT_IF_POSITIVE),
            drain: redis::Script::new(DRAIN),
            acquire_field: redis::Script::new(ACQUIRE_FIELD),
            release_field: redis::Script::new(RELEASE_FIELD),
        }
    }
}

/// Redis-backed sync store
///
/// Shares one bb8 pool of multiplexed connections between every primitive
/// created on top of it.
pub struct RedisStore {
    config: RedisConfig,
    pool: RedisPool,
    scripts: Scripts,
}

impl RedisStore {
    /// Connect to Redis and build the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server does
    /// not answer `PING`.
    pub async fn new(config: RedisConfig) -> StoreResult<Self> {
        debug!(url = %config.url, "Connecting to Redis sync store");
        let pool = RedisPoolBuilder::new(config.clone()).build().await?;
        Ok(Self::from_pool(config, pool))
    }

    /// Create from an existing pool.
    pub fn from_pool(config: RedisConfig, pool: RedisPool) -> Self {
        Self {
            config,
            pool,
            scripts: Scripts::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = self
            .timed(redis::cmd("PING").query_async(&mut *conn))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<RedisConnection<'_>> {
        Ok(self.pool.get().await?)
    }

    /// Bound a command by the configured command timeout.
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl SyncStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }

        let result: Option<String> = self.timed(cmd.query_async(&mut *conn)).await?;
        trace!(key = %key, written = result.is_some(), "SET NX");
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        self.timed(conn.get(key)).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: u32 = self.timed(conn.del(key)).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.timed(conn.exists(key)).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        let ttl_ms: i64 = self.timed(conn.pttl(key)).await?;

        match ttl_ms {
            // -2: key doesn't exist, -1: no expiration
            ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Ok(None),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        self.timed(conn.incr(key, delta)).await
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        self.timed(conn.hget(key, field)).await
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(conn.hlen(key)).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .timed(
                self.scripts
                    .compare_and_delete
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut *conn),
            )
            .await?;
        Ok(deleted == 1)
    }

    async fn decrement_if_at_least(&self, key: &str, amount: i64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let taken: i64 = self
            .timed(
                self.scripts
                    .decrement_if_at_least
                    .key(key)
                    .arg(amount)
                    .invoke_async(&mut *conn),
            )
            .await?;
        Ok(taken == 1)
    }

    async fn decrement_if_positive(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        self.timed(
            self.scripts
                .decrement_if_positive
                .key(key)
                .invoke_async(&mut *conn),
        )
        .await
    }

    async fn drain(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        self.timed(self.scripts.drain.key(key).invoke_async(&mut *conn))
            .await
    }

    async fn acquire_field(&self, req: FieldAcquire<'_>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        let mut invocation = self.scripts.acquire_field.key(req.key);
        if let Some(blocker) = req.blocked_by {
            invocation.key(blocker);
        }
        invocation
            .arg(req.field)
            .arg(req.ttl_secs)
            .arg(if req.exclusive { "1" } else { "0" })
            .arg(if req.blocked_by.is_some() { "1" } else { "0" });

        let acquired: i64 = self.timed(invocation.invoke_async(&mut *conn)).await?;
        trace!(key = %req.key, acquired = acquired == 1, "Field acquire");
        Ok(acquired == 1)
    }

    async fn release_field(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        let (held, remaining): (i64, i64) = self
            .timed(
                self.scripts
                    .release_field
                    .key(key)
                    .arg(field)
                    .invoke_async(&mut *conn),
            )
            .await?;
        Ok((held == 1).then_some(remaining))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.config.url)
            .field("pool_size", &self.config.pool_size)
            .finish()
    }
}
