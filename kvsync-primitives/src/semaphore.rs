//! Distributed counting semaphore

use kvsync_store::{StoreError, SyncStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::timing::Timing;

/// Parse a stored counter, treating an absent key as 0.
pub(crate) fn parse_counter(key: &str, raw: Option<String>) -> SyncResult<i64> {
    match raw {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| SyncError::Store(StoreError::wrong_type(key, "integer"))),
    }
}

fn permits_arg(permits: u64) -> SyncResult<i64> {
    if permits == 0 {
        return Err(SyncError::invalid_argument("permits must be at least 1"));
    }
    i64::try_from(permits).map_err(|_| SyncError::invalid_argument("permits out of range"))
}

/// A pool of permits kept as one integer counter at the bare key.
///
/// `release` is not capped: releasing more than was acquired raises the
/// available count above the number originally set.
pub struct Semaphore<S: ?Sized> {
    name: String,
    key: String,
    timing: Timing,
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> Semaphore<S> {
    pub(crate) fn new(name: &str, key: String, timing: Timing, store: Arc<S>) -> Self {
        Self {
            name: name.to_string(),
            key,
            timing,
            store,
        }
    }

    /// Logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Initialize the pool. Only the first caller wins; returns `false` if
    /// the counter already exists.
    pub async fn try_set_permits(&self, permits: u64) -> SyncResult<bool> {
        let permits = i64::try_from(permits)
            .map_err(|_| SyncError::invalid_argument("permits out of range"))?;
        let set = self
            .store
            .set_if_absent(&self.key, &permits.to_string(), None)
            .await?;

        if set {
            info!(semaphore = %self.key, permits = permits, "Initialized semaphore");
        }
        Ok(set)
    }

    /// Take `permits` if that many are available. Never blocks.
    pub async fn try_acquire(&self, permits: u64) -> SyncResult<bool> {
        let amount = permits_arg(permits)?;
        let acquired = self.store.decrement_if_at_least(&self.key, amount).await?;
        debug!(semaphore = %self.key, permits = permits, acquired = acquired, "Acquire attempt");
        Ok(acquired)
    }

    /// Take `permits`, polling until they become available or `wait`
    /// elapses. `None` waits forever.
    pub async fn acquire(&self, permits: u64, wait: Option<Duration>) -> SyncResult<bool> {
        permits_arg(permits)?;
        self.timing
            .poll(wait, move || self.try_acquire(permits))
            .await
    }

    /// Return `permits` to the pool.
    pub async fn release(&self, permits: u64) -> SyncResult<()> {
        let amount = permits_arg(permits)?;
        let available = self.store.incr_by(&self.key, amount).await?;
        debug!(semaphore = %self.key, permits = permits, available = available, "Released permits");
        Ok(())
    }

    /// Permits currently available, 0 when uninitialized.
    pub async fn available_permits(&self) -> SyncResult<u64> {
        let raw = self.store.get(&self.key).await?;
        Ok(parse_counter(&self.key, raw)?.max(0) as u64)
    }

    /// Take every available permit at once, returning how many were taken.
    pub async fn drain_permits(&self) -> SyncResult<u64> {
        let drained = self.store.drain(&self.key).await?;
        info!(semaphore = %self.key, drained = drained, "Drained permits");
        Ok(drained.max(0) as u64)
    }

    /// Remove the counter.
    pub async fn delete(&self) -> SyncResult<bool> {
        Ok(self.store.delete(&self.key).await?)
    }
}

impl<S: ?Sized> std::fmt::Debug for Semaphore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore").field("key", &self.key).finish()
    }
}
