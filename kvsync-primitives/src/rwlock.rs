//! Reentrant distributed read-write lock
//!
//! Two hashes share the logical name:
//!
//! - `{name}:write` holds at most one field, the writer's token, mapped to its
//!   reentrancy count
//! - `{name}:read` holds one field per reader token, each with its own count
//!
//! Readers only exclude the writer; the writer excludes everyone. Each hash
//! carries its own lease, refreshed on every acquisition.
//!
//! By default a side checks that the other hash is absent and then increments
//! its own hash in a second round trip. Between the two, the other side can
//! acquire, so a reader and a writer may briefly both hold the lock. Enable
//! [`SyncConfig::strict_read_write`](crate::SyncConfig) to run the check and
//! the increment as one atomic store operation.

use async_trait::async_trait;
use kvsync_store::{FieldAcquire, SyncStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::lock::DistributedLock;
use crate::timing::Timing;
use crate::token::OwnerToken;

/// Key of the read side for a store key.
pub fn read_key(key: &str) -> String {
    format!("{}:read", key)
}

/// Key of the write side for a store key.
pub fn write_key(key: &str) -> String {
    format!("{}:write", key)
}

/// One side of the pair. Read and write differ only in whether other
/// holders of the same side are tolerated.
struct HashLock<S: ?Sized> {
    name: String,
    key: String,
    peer_key: String,
    exclusive: bool,
    strict: bool,
    token: OwnerToken,
    timing: Timing,
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> HashLock<S> {
    fn side(&self) -> &'static str {
        if self.exclusive { "write" } else { "read" }
    }

    async fn try_once(&self, ttl_secs: u64) -> SyncResult<bool> {
        let mut req = FieldAcquire::new(&self.key, self.token.as_str(), ttl_secs);
        if self.exclusive {
            req = req.exclusive();
        }

        if self.strict {
            req = req.blocked_by(&self.peer_key);
        } else if self.store.exists(&self.peer_key).await? {
            debug!(lock = %self.key, blocker = %self.peer_key, "Blocked by other side");
            return Ok(false);
        }

        let acquired = self.store.acquire_field(req).await?;
        if acquired {
            info!(lock = %self.key, side = self.side(), ttl_secs = ttl_secs, "Acquired lock");
        } else {
            debug!(lock = %self.key, side = self.side(), "Lock held elsewhere");
        }
        Ok(acquired)
    }

    async fn acquire(&self, wait: Option<Duration>, lease: Option<Duration>) -> SyncResult<bool> {
        let ttl_secs = self.timing.lease_secs(lease)?;
        self.timing.poll(wait, move || self.try_once(ttl_secs)).await
    }

    async fn unlock(&self) -> SyncResult<bool> {
        match self
            .store
            .release_field(&self.key, self.token.as_str())
            .await?
        {
            Some(remaining) => {
                info!(lock = %self.key, side = self.side(), remaining = remaining, "Released lock");
                Ok(true)
            }
            None => {
                warn!(lock = %self.key, side = self.side(), "Unlock refused (not held or lease expired)");
                Ok(false)
            }
        }
    }

    async fn hold_count(&self) -> SyncResult<u64> {
        let count = self.store.hget(&self.key, self.token.as_str()).await?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn force_unlock(&self) -> SyncResult<bool> {
        let deleted = self.store.delete(&self.key).await?;
        warn!(lock = %self.key, side = self.side(), deleted = deleted, "Force unlocked");
        Ok(deleted)
    }
}

macro_rules! delegate_lock {
    ($ty:ident) => {
        #[async_trait]
        impl<S: SyncStore + ?Sized> DistributedLock for $ty<S> {
            async fn lock(&self, lease: Option<Duration>) -> SyncResult<()> {
                self.inner.acquire(None, lease).await?;
                Ok(())
            }

            async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> SyncResult<bool> {
                self.inner.acquire(Some(wait), lease).await
            }

            async fn unlock(&self) -> SyncResult<bool> {
                self.inner.unlock().await
            }

            async fn is_locked(&self) -> SyncResult<bool> {
                Ok(self.inner.store.exists(&self.inner.key).await?)
            }

            async fn is_held_by_current(&self) -> SyncResult<bool> {
                Ok(self.inner.hold_count().await? > 0)
            }

            async fn force_unlock(&self) -> SyncResult<bool> {
                self.inner.force_unlock().await
            }

            async fn remaining_lease(&self) -> SyncResult<Option<Duration>> {
                Ok(self.inner.store.ttl(&self.inner.key).await?)
            }

            fn name(&self) -> &str {
                &self.inner.name
            }
        }

        impl<S: SyncStore + ?Sized> $ty<S> {
            /// Reentrancy count held by this instance, 0 if none.
            pub async fn hold_count(&self) -> SyncResult<u64> {
                self.inner.hold_count().await
            }

            /// Store key of this side.
            pub fn key(&self) -> &str {
                &self.inner.key
            }

            /// Owner token of this side.
            pub fn token(&self) -> &OwnerToken {
                &self.inner.token
            }
        }

        impl<S: ?Sized> std::fmt::Debug for $ty<S> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("key", &self.inner.key)
                    .field("token", &self.inner.token)
                    .field("strict", &self.inner.strict)
                    .finish()
            }
        }
    };
}

/// Shared side of a [`ReadWriteLock`]. Reentrant per instance.
pub struct ReadLock<S: ?Sized> {
    inner: HashLock<S>,
}

impl<S: SyncStore + ?Sized> ReadLock<S> {
    /// Number of distinct reader tokens currently holding the lock.
    pub async fn reader_count(&self) -> SyncResult<u64> {
        Ok(self.inner.store.hlen(&self.inner.key).await?)
    }
}

/// Exclusive side of a [`ReadWriteLock`]. Reentrant per instance.
pub struct WriteLock<S: ?Sized> {
    inner: HashLock<S>,
}

delegate_lock!(ReadLock);
delegate_lock!(WriteLock);

/// A reader side and a writer side over one logical name.
///
/// Each side has its own owner token, so holding the read side of an
/// instance does not let its write side in, and vice versa.
pub struct ReadWriteLock<S: ?Sized> {
    name: String,
    read: ReadLock<S>,
    write: WriteLock<S>,
}

impl<S: SyncStore + ?Sized> ReadWriteLock<S> {
    pub(crate) fn new(name: &str, key: &str, timing: Timing, strict: bool, store: Arc<S>) -> Self {
        let read_key = read_key(key);
        let write_key = write_key(key);

        let read = ReadLock {
            inner: HashLock {
                name: name.to_string(),
                key: read_key.clone(),
                peer_key: write_key.clone(),
                exclusive: false,
                strict,
                token: OwnerToken::generate(),
                timing,
                store: store.clone(),
            },
        };
        let write = WriteLock {
            inner: HashLock {
                name: name.to_string(),
                key: write_key,
                peer_key: read_key,
                exclusive: true,
                strict,
                token: OwnerToken::generate(),
                timing,
                store,
            },
        };

        Self {
            name: name.to_string(),
            read,
            write,
        }
    }

    /// Logical name shared by both sides.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared side.
    pub fn read_lock(&self) -> &ReadLock<S> {
        &self.read
    }

    /// The exclusive side.
    pub fn write_lock(&self) -> &WriteLock<S> {
        &self.write
    }

    /// Whether any writer holds the lock.
    pub async fn is_write_locked(&self) -> SyncResult<bool> {
        self.write.is_locked().await
    }
}

impl<S: ?Sized> std::fmt::Debug for ReadWriteLock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("name", &self.name)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}
