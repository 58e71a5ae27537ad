//! The store seam used by every synchronization primitive.
//!
//! Backends:
//!
//! - **Memory**: process-local storage, for tests and single-instance use
//! - **Redis**: shared storage for multi-process coordination

use crate::error::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// A single atomic "increment my field in a hash" request.
///
/// The field is incremented by one and the whole hash gets `ttl_secs` as its
/// expiry. The guards are evaluated in the same atomic step as the write:
///
/// - `exclusive`: fail if the hash holds any field other than `field`
/// - `blocked_by`: fail if that other key exists
#[derive(Debug, Clone, Copy)]
pub struct FieldAcquire<'a> {
    /// Hash key.
    pub key: &'a str,
    /// Field (owner token) to increment.
    pub field: &'a str,
    /// Expiry applied to the hash on success.
    pub ttl_secs: u64,
    /// Refuse when another field is present.
    pub exclusive: bool,
    /// Refuse when this key exists.
    pub blocked_by: Option<&'a str>,
}

impl<'a> FieldAcquire<'a> {
    /// Unconditional increment with TTL refresh.
    pub fn new(key: &'a str, field: &'a str, ttl_secs: u64) -> Self {
        Self {
            key,
            field,
            ttl_secs,
            exclusive: false,
            blocked_by: None,
        }
    }

    /// Refuse when any other field is present.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Refuse when `key` exists.
    pub fn blocked_by(mut self, key: &'a str) -> Self {
        self.blocked_by = Some(key);
        self
    }
}

/// Store operations required by the locks, semaphores and latches.
///
/// Each conditional read-then-write is a single named operation so that a
/// backend can make it atomic (a Lua script for Redis, one critical section
/// for the memory store). Expiry granularity is whole seconds.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// `SET key value NX [EX ttl]`. Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>)
    -> StoreResult<bool>;

    /// `GET key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// `DEL key`. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining time to live. `None` if the key is absent or never expires.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// `INCRBY key delta`, creating the counter at 0 when absent.
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// `HGET key field` parsed as an integer.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<i64>>;

    /// `HLEN key`.
    async fn hlen(&self, key: &str) -> StoreResult<u64>;

    /// Delete `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Decrement the counter at `key` by `amount` only if it holds at least
    /// `amount`. An absent counter counts as 0.
    async fn decrement_if_at_least(&self, key: &str, amount: i64) -> StoreResult<bool>;

    /// Decrement the counter at `key` by one if it is positive. Returns the
    /// resulting value, or `None` when the counter was absent or already at
    /// 0 and nothing changed.
    async fn decrement_if_positive(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Read the counter at `key` and reset it to 0, returning the old value.
    /// An absent or zero counter is left untouched and yields 0.
    async fn drain(&self, key: &str) -> StoreResult<i64>;

    /// Increment a hash field under the guards of `req`.
    async fn acquire_field(&self, req: FieldAcquire<'_>) -> StoreResult<bool>;

    /// Release one reentrant level of `field` in the hash at `key`.
    ///
    /// Returns `None` without touching anything if the field is absent.
    /// Otherwise decrements it, removes the field once it reaches zero,
    /// removes the key once no fields remain, and returns the remaining
    /// count.
    async fn release_field(&self, key: &str, field: &str) -> StoreResult<Option<i64>>;

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}
