//! Distributed mutual-exclusion locks

use async_trait::async_trait;
use kvsync_store::SyncStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::timing::Timing;
use crate::token::OwnerToken;

/// Operations shared by every lock flavour.
///
/// A `lease` of `None` uses the client's default lease. A `wait` of
/// [`Duration::ZERO`] makes a single non-blocking attempt.
///
/// There is no lease renewal: a critical section that outlives its lease
/// loses the lock without notice, and another owner may acquire it.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire, waiting as long as it takes.
    async fn lock(&self, lease: Option<Duration>) -> SyncResult<()>;

    /// Try to acquire, polling until `wait` elapses.
    async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> SyncResult<bool>;

    /// Release one hold. Returns `false` if this instance does not hold the
    /// lock, in which case nothing in the store is touched.
    async fn unlock(&self) -> SyncResult<bool>;

    /// Whether anyone holds the lock.
    async fn is_locked(&self) -> SyncResult<bool>;

    /// Whether this instance holds the lock.
    async fn is_held_by_current(&self) -> SyncResult<bool>;

    /// Delete the lock regardless of owner.
    async fn force_unlock(&self) -> SyncResult<bool>;

    /// Time left on the lease, `None` if the lock is free.
    async fn remaining_lease(&self) -> SyncResult<Option<Duration>>;

    /// Logical name of the lock.
    fn name(&self) -> &str;
}

/// Single-owner lock stored as `key -> token` with an expiry.
///
/// Not reentrant: a second `try_lock` from the instance that already holds
/// it fails like any other contender.
pub struct MutexLock<S: ?Sized> {
    name: String,
    key: String,
    token: OwnerToken,
    timing: Timing,
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> MutexLock<S> {
    pub(crate) fn new(name: &str, key: String, timing: Timing, store: Arc<S>) -> Self {
        Self {
            name: name.to_string(),
            key,
            token: OwnerToken::generate(),
            timing,
            store,
        }
    }

    /// Store key of the lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token of this instance.
    pub fn token(&self) -> &OwnerToken {
        &self.token
    }

    async fn try_once(&self, ttl_secs: u64) -> SyncResult<bool> {
        let acquired = self
            .store
            .set_if_absent(&self.key, self.token.as_str(), Some(ttl_secs))
            .await?;

        if acquired {
            info!(lock = %self.key, ttl_secs = ttl_secs, "Acquired lock");
        } else {
            debug!(lock = %self.key, "Lock already held");
        }
        Ok(acquired)
    }

    async fn acquire(&self, wait: Option<Duration>, lease: Option<Duration>) -> SyncResult<bool> {
        let ttl_secs = self.timing.lease_secs(lease)?;
        self.timing.poll(wait, move || self.try_once(ttl_secs)).await
    }
}

#[async_trait]
impl<S: SyncStore + ?Sized> DistributedLock for MutexLock<S> {
    async fn lock(&self, lease: Option<Duration>) -> SyncResult<()> {
        self.acquire(None, lease).await?;
        Ok(())
    }

    async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> SyncResult<bool> {
        self.acquire(Some(wait), lease).await
    }

    async fn unlock(&self) -> SyncResult<bool> {
        let released = self
            .store
            .compare_and_delete(&self.key, self.token.as_str())
            .await?;

        if released {
            info!(lock = %self.key, "Released lock");
        } else {
            warn!(lock = %self.key, "Unlock refused (not held or lease expired)");
        }
        Ok(released)
    }

    async fn is_locked(&self) -> SyncResult<bool> {
        Ok(self.store.exists(&self.key).await?)
    }

    async fn is_held_by_current(&self) -> SyncResult<bool> {
        let holder = self.store.get(&self.key).await?;
        Ok(holder.as_deref() == Some(self.token.as_str()))
    }

    async fn force_unlock(&self) -> SyncResult<bool> {
        let deleted = self.store.delete(&self.key).await?;
        warn!(lock = %self.key, deleted = deleted, "Force unlocked");
        Ok(deleted)
    }

    async fn remaining_lease(&self) -> SyncResult<Option<Duration>> {
        Ok(self.store.ttl(&self.key).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<S: ?Sized> std::fmt::Debug for MutexLock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncClient;
    use kvsync_store::MemoryStore;

    fn client() -> SyncClient<MemoryStore> {
        SyncClient::in_memory()
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let client = client();
        let lock = client.mutex_lock("res");

        assert!(lock.try_lock(Duration::ZERO, None).await.unwrap());
        assert!(lock.is_locked().await.unwrap());
        assert!(lock.is_held_by_current().await.unwrap());

        assert!(lock.unlock().await.unwrap());
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_not_reentrant() {
        let client = client();
        let lock = client.mutex_lock("res");

        assert!(lock.try_lock(Duration::ZERO, None).await.unwrap());
        assert!(!lock.try_lock(Duration::ZERO, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_by_non_owner_keeps_lock() {
        let client = client();
        let owner = client.mutex_lock("res");
        let other = client.mutex_lock("res");

        assert!(owner.try_lock(Duration::ZERO, None).await.unwrap());
        assert!(!other.unlock().await.unwrap());
        assert!(!other.is_held_by_current().await.unwrap());
        assert!(owner.is_held_by_current().await.unwrap());
    }

    #[tokio::test]
    async fn test_force_unlock_ignores_owner() {
        let client = client();
        let owner = client.mutex_lock("res");
        let admin = client.mutex_lock("res");

        owner.lock(None).await.unwrap();
        assert!(admin.force_unlock().await.unwrap());
        assert!(!owner.is_locked().await.unwrap());
        assert!(!owner.unlock().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_lock_waits_for_release() {
        let client = client();
        let holder = Arc::new(client.mutex_lock("res"));
        let waiter = client.mutex_lock("res");

        holder.lock(None).await.unwrap();

        let releaser = holder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.unlock().await.unwrap();
        });

        assert!(waiter.try_lock(Duration::from_secs(1), None).await.unwrap());
        assert!(waiter.is_held_by_current().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_lock_with_max_wait_waits_for_release() {
        let client = client();
        let holder = Arc::new(client.mutex_lock("res"));
        let waiter = client.mutex_lock("res");

        holder.lock(None).await.unwrap();

        let releaser = holder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.unlock().await.unwrap();
        });

        assert!(waiter.try_lock(Duration::MAX, None).await.unwrap());
        assert!(waiter.is_held_by_current().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_lock_times_out() {
        let client = client();
        let holder = client.mutex_lock("res");
        let waiter = client.mutex_lock("res");

        holder.lock(None).await.unwrap();

        let start = tokio::time::Instant::now();
        assert!(!waiter.try_lock(Duration::from_millis(500), None).await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_frees_lock() {
        let client = client();
        let crashed = client.mutex_lock("res");
        let next = client.mutex_lock("res");

        assert!(
            crashed
                .try_lock(Duration::ZERO, Some(Duration::from_millis(1000)))
                .await
                .unwrap()
        );
        let lease = crashed.remaining_lease().await.unwrap().unwrap();
        assert!(lease <= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(!crashed.is_locked().await.unwrap());
        assert!(next.try_lock(Duration::ZERO, None).await.unwrap());
        assert!(!crashed.unlock().await.unwrap());
        assert!(next.is_held_by_current().await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_lease_rejected_before_store_call() {
        let client = client();
        let lock = client.mutex_lock("res");

        let err = lock
            .try_lock(Duration::ZERO, Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::InvalidArgument(_)));
        assert!(!lock.is_locked().await.unwrap());
    }
}
