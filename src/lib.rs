// kvsync - distributed synchronization primitives on a key-value store
//
// Locks, read-write locks, semaphores and countdown latches whose state lives
// entirely in Redis (or an in-process store for tests), so any number of
// processes can coordinate without a lock server.

// Re-export the primitives
pub use kvsync_primitives::*;

// Re-export the store seam
pub use kvsync_store::{FieldAcquire, MemoryStore, StoreError, StoreResult, SyncStore};

#[cfg(feature = "redis")]
pub use kvsync_store::{RedisConfig, RedisConfigBuilder, RedisPool, RedisPoolBuilder, RedisStore};

pub use kvsync_primitives;
pub use kvsync_store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use kvsync_primitives::{
        CountDownLatch, DistributedLock, MutexLock, ReadLock, ReadWriteLock, Semaphore,
        SyncClient, SyncConfig, SyncError, SyncResult, WriteLock,
    };
    pub use kvsync_store::{MemoryStore, SyncStore};

    #[cfg(feature = "redis")]
    pub use kvsync_store::{RedisConfig, RedisStore};
}
