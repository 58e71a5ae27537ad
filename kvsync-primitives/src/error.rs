//! Error types for the synchronization primitives.

use kvsync_store::StoreError;
use thiserror::Error;

/// Result type for primitive operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the primitives.
///
/// Contention is not an error: a busy lock, missing permits or a latch that
/// has not reached zero come back as `Ok(false)`. Only infrastructure
/// failures and bad arguments end up here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store failed; never retried internally.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A caller-supplied argument was rejected before any store call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::InvalidArgument(_) | Self::Config(_) => false,
        }
    }
}
