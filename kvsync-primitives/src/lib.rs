//! Distributed synchronization primitives over a shared key-value store.
//!
//! Processes on different hosts coordinate through the store alone; there is
//! no lock server.
//!
//! ## Features
//!
//! - **Mutex Lock** - single owner, lease-bounded
//! - **Read-Write Lock** - reentrant readers and writer over two hashes
//! - **Semaphore** - permit counter with first-writer-wins initialization
//! - **CountDownLatch** - one-shot gate that opens at zero
//!
//! Waiting is plain polling on a fixed interval (100 ms by default). There is
//! no waiter queue and no lease renewal: a holder that crashes is cleaned up
//! by its lease expiring, and a holder that outlives its lease loses the lock.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kvsync_primitives::*;
//! use kvsync_store::RedisConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncClient::connect(RedisConfig::from_env().build(), SyncConfig::default()).await?;
//!
//!     let lock = client.mutex_lock("invoices");
//!     if lock.try_lock(Duration::from_secs(5), Some(Duration::from_secs(30))).await? {
//!         // critical section
//!         lock.unlock().await?;
//!     }
//!
//!     let latch = client.count_down_latch("workers-ready");
//!     latch.try_set_count(3).await?;
//!     latch.wait(Some(Duration::from_secs(60))).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod latch;
pub mod lock;
pub mod rwlock;
pub mod semaphore;
pub mod token;

mod timing;

pub use client::SyncClient;
pub use config::{DEFAULT_LEASE, DEFAULT_POLL_INTERVAL, SyncConfig, SyncConfigBuilder};
pub use error::{SyncError, SyncResult};
pub use latch::CountDownLatch;
pub use lock::{DistributedLock, MutexLock};
pub use rwlock::{ReadLock, ReadWriteLock, WriteLock, read_key, write_key};
pub use semaphore::Semaphore;
pub use token::OwnerToken;
