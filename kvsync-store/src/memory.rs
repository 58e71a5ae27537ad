//! In-memory store
//!
//! Keeps every key in one mutex-guarded map so that operations touching two
//! keys (`blocked_by` guards) see a consistent snapshot. Expiry is checked
//! lazily, per touched key, against the tokio clock, which lets tests drive
//! lease expiry with paused time. Suitable for tests and single-instance deployments; for
//! coordination between processes use the Redis store.

use crate::error::{StoreError, StoreResult};
use crate::store::{FieldAcquire, SyncStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Stored value, mirroring the Redis types the primitives use.
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn expiry(ttl_secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(ttl_secs)
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

/// Map view with the expired entries among the touched keys removed.
struct Live<'a> {
    map: &'a mut HashMap<String, Entry>,
}

impl<'a> Live<'a> {
    fn new(map: &'a mut HashMap<String, Entry>, keys: &[&str]) -> Self {
        let now = Instant::now();
        for key in keys {
            if map.get(*key).is_some_and(|entry| entry.is_expired(now)) {
                map.remove(*key);
            }
        }
        Self { map }
    }

    fn counter(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.map.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|_| StoreError::wrong_type(key, "integer")),
            Some(Value::Hash(_)) => Err(StoreError::wrong_type(key, "string")),
        }
    }

    /// Overwrite a counter, keeping any expiry already set on it.
    fn set_counter(&mut self, key: &str, value: i64) {
        let expires_at = self.map.get(key).and_then(|e| e.expires_at);
        self.map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
    }

    fn hash(&self, key: &str) -> StoreResult<Option<&HashMap<String, i64>>> {
        match self.map.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(Value::Str(_)) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hash_mut(&mut self, key: &str) -> StoreResult<&mut Entry> {
        let entry = self.map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        if matches!(entry.value, Value::Str(_)) {
            return Err(StoreError::wrong_type(key, "hash"));
        }
        Ok(entry)
    }
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory sync store");
        Self::default()
    }

    /// Number of live keys (for monitoring and tests)
    pub fn key_count(&self) -> usize {
        let mut map = self.entries.lock();
        let now = Instant::now();
        map.retain(|_, entry| !entry.is_expired(now));
        map.len()
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        if live.map.contains_key(key) {
            trace!(key = %key, "SET NX: key exists");
            return Ok(false);
        }
        live.map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl_secs.map(expiry),
            },
        );
        trace!(key = %key, ttl_secs = ?ttl_secs, "SET NX: written");
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        match live.map.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Hash(_)) => Err(StoreError::wrong_type(key, "string")),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        Ok(live.map.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        Ok(live.map.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        let now = Instant::now();
        Ok(live
            .map
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut map = self.entries.lock();
        let mut live = Live::new(&mut map, &[key]);
        let current = live.counter(key)?.unwrap_or(0);
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::command(format!("increment overflow on {}", key)))?;
        live.set_counter(key, next);
        Ok(next)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        Ok(live.hash(key)?.and_then(|h| h.get(field).copied()))
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        Ok(live.hash(key)?.map_or(0, |h| h.len() as u64))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);
        let matches = matches!(
            live.map.get(key).map(|e| &e.value),
            Some(Value::Str(current)) if current == expected
        );
        if matches {
            live.map.remove(key);
        }
        Ok(matches)
    }

    async fn decrement_if_at_least(&self, key: &str, amount: i64) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let mut live = Live::new(&mut map, &[key]);
        let current = live.counter(key)?.unwrap_or(0);
        if current < amount {
            trace!(key = %key, current = current, amount = amount, "Conditional decrement refused");
            return Ok(false);
        }
        live.set_counter(key, current - amount);
        Ok(true)
    }

    async fn decrement_if_positive(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut map = self.entries.lock();
        let mut live = Live::new(&mut map, &[key]);
        match live.counter(key)? {
            Some(current) if current > 0 => {
                live.set_counter(key, current - 1);
                Ok(Some(current - 1))
            }
            _ => Ok(None),
        }
    }

    async fn drain(&self, key: &str) -> StoreResult<i64> {
        let mut map = self.entries.lock();
        let mut live = Live::new(&mut map, &[key]);
        match live.counter(key)? {
            None | Some(0) => Ok(0),
            Some(current) => {
                live.set_counter(key, 0);
                Ok(current)
            }
        }
    }

    async fn acquire_field(&self, req: FieldAcquire<'_>) -> StoreResult<bool> {
        let mut map = self.entries.lock();
        let mut live = match req.blocked_by {
            Some(blocker) => Live::new(&mut map, &[req.key, blocker]),
            None => Live::new(&mut map, &[req.key]),
        };

        if let Some(blocker) = req.blocked_by
            && live.map.contains_key(blocker)
        {
            trace!(key = %req.key, blocker = %blocker, "Field acquire blocked");
            return Ok(false);
        }

        if req.exclusive
            && let Some(hash) = live.hash(req.key)?
            && hash.keys().any(|f| f != req.field)
        {
            trace!(key = %req.key, "Field acquire refused: held by another field");
            return Ok(false);
        }

        let entry = live.hash_mut(req.key)?;
        if let Value::Hash(hash) = &mut entry.value {
            *hash.entry(req.field.to_string()).or_insert(0) += 1;
        }
        entry.expires_at = Some(expiry(req.ttl_secs));
        Ok(true)
    }

    async fn release_field(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut map = self.entries.lock();
        let live = Live::new(&mut map, &[key]);

        let Some(entry) = live.map.get_mut(key) else {
            return Ok(None);
        };
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StoreError::wrong_type(key, "hash"));
        };
        let Some(count) = hash.get_mut(field) else {
            return Ok(None);
        };

        *count -= 1;
        let remaining = *count;
        if remaining <= 0 {
            hash.remove(field);
        }
        if hash.is_empty() {
            live.map.remove(key);
        }
        Ok(Some(remaining))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
