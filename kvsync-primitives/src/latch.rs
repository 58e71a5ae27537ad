//! Distributed countdown latch

use kvsync_store::SyncStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::semaphore::parse_counter;
use crate::timing::Timing;

/// One-shot gate: waiters pass once the counter at the bare key reaches 0.
///
/// The count only goes down, and stops at 0.
pub struct CountDownLatch<S: ?Sized> {
    name: String,
    key: String,
    timing: Timing,
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> CountDownLatch<S> {
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

    /// Initialize the count. Returns `false` if the latch already exists.
    pub async fn try_set_count(&self, count: u64) -> SyncResult<bool> {
        let count =
            i64::try_from(count).map_err(|_| SyncError::invalid_argument("count out of range"))?;
        let set = self
            .store
            .set_if_absent(&self.key, &count.to_string(), None)
            .await?;

        if set {
            info!(latch = %self.key, count = count, "Initialized latch");
        }
        Ok(set)
    }

    /// Decrement the count unless it is already 0. Returns the new count.
    pub async fn count_down(&self) -> SyncResult<u64> {
        match self.store.decrement_if_positive(&self.key).await? {
            Some(0) => {
                info!(latch = %self.key, "Latch open");
                Ok(0)
            }
            Some(remaining) => {
                debug!(latch = %self.key, remaining = remaining, "Counted down");
                Ok(remaining.max(0) as u64)
            }
            None => {
                debug!(latch = %self.key, "Latch already open");
                Ok(0)
            }
        }
    }

    /// Current count, 0 when the latch does not exist.
    pub async fn get_count(&self) -> SyncResult<u64> {
        let raw = self.store.get(&self.key).await?;
        Ok(parse_counter(&self.key, raw)?.max(0) as u64)
    }

    /// Wait until the count reaches 0. `None` waits forever.
    ///
    /// Returns `true` as soon as the count is observed at 0 (immediately if
    /// it already is), `false` if `timeout` elapses first.
    pub async fn wait(&self, timeout: Option<Duration>) -> SyncResult<bool> {
        self.timing
            .poll(timeout, move || async move { self.get_count().await.map(|count| count == 0) })
            .await
    }

    /// Remove the latch.
    pub async fn delete(&self) -> SyncResult<bool> {
        Ok(self.store.delete(&self.key).await?)
    }
}

impl<S: ?Sized> std::fmt::Debug for CountDownLatch<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountDownLatch")
            .field("key", &self.key)
            .finish()
    }
}
