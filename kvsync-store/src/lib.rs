//! # kvsync store
//!
//! The key-value store seam underneath the kvsync primitives.
//!
//! The locks, semaphores and latches never talk to a database directly. They
//! issue the typed operations of [`SyncStore`]: plain reads and writes plus a
//! handful of atomic conditional operations (compare-and-delete,
//! decrement-if-at-least, guarded hash increments). A backend only has to
//! make each of those operations atomic.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: one process, no dependencies, honours TTLs on the tokio
//!   clock
//! - [`RedisStore`] (`redis` feature, enabled by default): bb8-pooled
//!   connections, Lua scripts for the conditional operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kvsync_store::{RedisConfig, RedisStore, SyncStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .pool_size(10)
//!         .build();
//!
//!     let store = RedisStore::new(config).await?;
//!
//!     if store.set_if_absent("jobs:nightly", "worker-1", Some(30)).await? {
//!         // exclusive work
//!         store.compare_and_delete("jobs:nightly", "worker-1").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;
mod memory;
mod store;

#[cfg(feature = "redis")]
mod config;
#[cfg(feature = "redis")]
mod pool;
#[cfg(feature = "redis")]
mod redis_store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{FieldAcquire, SyncStore};

#[cfg(feature = "redis")]
pub use config::{RedisConfig, RedisConfigBuilder};
#[cfg(feature = "redis")]
pub use pool::{RedisConnection, RedisPool, RedisPoolBuilder};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

// Re-export redis crate for convenience
#[cfg(feature = "redis")]
pub use redis;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::memory::MemoryStore;
    pub use crate::store::{FieldAcquire, SyncStore};

    #[cfg(feature = "redis")]
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    #[cfg(feature = "redis")]
    pub use crate::redis_store::RedisStore;
}
