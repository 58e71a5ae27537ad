//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store errors.
///
/// These are infrastructure failures only. "Key already held" or "not enough
/// permits" are ordinary return values of the [`SyncStore`](crate::SyncStore)
/// operations, never errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Command error.
    #[error("Command error: {0}")]
    Command(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A key holds a value of a different type than the operation expects.
    #[error("Wrong type for key {key}: expected {expected}")]
    WrongType {
        /// Offending key.
        key: String,
        /// Type the operation needed.
        expected: &'static str,
    },

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Underlying Redis error.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Create a command error.
    pub fn command<S: Into<String>>(msg: S) -> Self {
        Self::Command(msg.into())
    }

    /// Create a wrong-type error.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::Pool(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            _ => false,
        }
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(e) => e.is_connection_dropped() || e.is_connection_refusal(),
            _ => false,
        }
    }
}

#[cfg(feature = "redis")]
impl<E> From<bb8::RunError<E>> for StoreError
where
    E: std::error::Error + 'static,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::TimedOut => Self::Timeout,
            bb8::RunError::User(e) => Self::Pool(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Timeout.is_retryable());
        assert!(StoreError::Connection("reset".into()).is_retryable());
        assert!(!StoreError::command("bad script").is_retryable());
        assert!(!StoreError::wrong_type("k", "hash").is_retryable());
    }

    #[test]
    fn test_wrong_type_display() {
        let err = StoreError::wrong_type("orders", "counter");
        assert_eq!(err.to_string(), "Wrong type for key orders: expected counter");
    }
}
