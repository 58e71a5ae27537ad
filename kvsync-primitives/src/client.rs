//! Entry point handing out primitives bound to one store.

use kvsync_store::{MemoryStore, SyncStore};
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::latch::CountDownLatch;
use crate::lock::MutexLock;
use crate::rwlock::ReadWriteLock;
use crate::semaphore::Semaphore;

/// Creates primitives that share a store and a [`SyncConfig`].
///
/// Primitives are cheap to create. Each lock instance generates its own owner
/// token, so create one instance per logical owner and keep using it from a
/// single task.
pub struct SyncClient<S: ?Sized> {
    config: SyncConfig,
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> SyncClient<S> {
    /// Create a client after validating `config`.
    pub fn new(store: Arc<S>, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        debug!(
            backend = store.backend_name(),
            strict_read_write = config.strict_read_write,
            "Created sync client"
        );
        Ok(Self { config, store })
    }

    /// Client configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Exclusive lock stored at `name`.
    pub fn mutex_lock(&self, name: &str) -> MutexLock<S> {
        MutexLock::new(
            name,
            self.config.key(name),
            self.config.timing(),
            self.store.clone(),
        )
    }

    /// Read-write lock stored at `name:read` / `name:write`.
    pub fn read_write_lock(&self, name: &str) -> ReadWriteLock<S> {
        ReadWriteLock::new(
            name,
            &self.config.key(name),
            self.config.timing(),
            self.config.strict_read_write,
            self.store.clone(),
        )
    }

    /// Semaphore stored at `name`.
    pub fn semaphore(&self, name: &str) -> Semaphore<S> {
        Semaphore::new(
            name,
            self.config.key(name),
            self.config.timing(),
            self.store.clone(),
        )
    }

    /// Countdown latch stored at `name`.
    pub fn count_down_latch(&self, name: &str) -> CountDownLatch<S> {
        CountDownLatch::new(
            name,
            self.config.key(name),
            self.config.timing(),
            self.store.clone(),
        )
    }
}

impl SyncClient<MemoryStore> {
    /// Client over a fresh in-memory store with default settings.
    pub fn in_memory() -> Self {
        Self {
            config: SyncConfig::default(),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

#[cfg(feature = "redis")]
impl SyncClient<kvsync_store::RedisStore> {
    /// Connect to Redis and create a client.
    pub async fn connect(redis: kvsync_store::RedisConfig, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let store = kvsync_store::RedisStore::new(redis).await?;
        Self::new(Arc::new(store), config)
    }
}

impl<S: ?Sized> Clone for SyncClient<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for SyncClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("config", &self.config)
            .finish()
    }
}
