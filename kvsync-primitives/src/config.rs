//! Client configuration shared by every primitive.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::timing::Timing;

/// Lease applied when a caller does not pass one.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Fixed delay between polling attempts while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lease used by `lock(None)` / `try_lock(.., None)`.
    #[serde(with = "millis", default = "default_lease")]
    pub default_lease: Duration,
    /// Sleep between attempts while a blocking call waits.
    #[serde(with = "millis", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Collapse the read/write lock's "other side absent" check and its hash
    /// increment into one atomic store operation.
    ///
    /// Off by default: the check and the increment are then two round trips,
    /// and a writer can slip in between a reader's check and its increment.
    #[serde(default)]
    pub strict_read_write: bool,
    /// Namespace prepended to every logical name as `{prefix}:{name}`.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

fn default_lease() -> Duration {
    DEFAULT_LEASE
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_lease: DEFAULT_LEASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            strict_read_write: false,
            key_prefix: None,
        }
    }
}

impl SyncConfig {
    /// Create a builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `KVSYNC_DEFAULT_LEASE_MS`
    /// - `KVSYNC_POLL_INTERVAL_MS`
    /// - `KVSYNC_STRICT_READ_WRITE` (`1`/`true` to enable)
    /// - `KVSYNC_KEY_PREFIX`
    pub fn from_env() -> SyncConfigBuilder {
        let mut builder = SyncConfigBuilder::new();

        if let Ok(lease) = std::env::var("KVSYNC_DEFAULT_LEASE_MS")
            && let Ok(ms) = lease.parse()
        {
            builder = builder.default_lease(Duration::from_millis(ms));
        }

        if let Ok(interval) = std::env::var("KVSYNC_POLL_INTERVAL_MS")
            && let Ok(ms) = interval.parse()
        {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }

        if let Ok(strict) = std::env::var("KVSYNC_STRICT_READ_WRITE") {
            builder = builder.strict_read_write(matches!(
                strict.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }

        if let Ok(prefix) = std::env::var("KVSYNC_KEY_PREFIX")
            && !prefix.is_empty()
        {
            builder = builder.key_prefix(prefix);
        }

        builder
    }

    /// Reject settings that would make every call fail or spin.
    pub fn validate(&self) -> SyncResult<()> {
        if self.default_lease.is_zero() {
            return Err(SyncError::config("default_lease must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::config("poll_interval must be positive"));
        }
        if let Some(prefix) = &self.key_prefix
            && prefix.is_empty()
        {
            return Err(SyncError::config("key_prefix must not be empty"));
        }
        Ok(())
    }

    /// Store key for a logical name.
    pub fn key(&self, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => name.to_string(),
        }
    }

    pub(crate) fn timing(&self) -> Timing {
        Timing {
            default_lease: self.default_lease,
            poll_interval: self.poll_interval,
        }
    }
}

/// Builder for [`SyncConfig`].
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    /// Set the default lease.
    pub fn default_lease(mut self, lease: Duration) -> Self {
        self.config.default_lease = lease;
        self
    }

    /// Set the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Enable or disable strict read/write acquisition.
    pub fn strict_read_write(mut self, strict: bool) -> Self {
        self.config.strict_read_write = strict;
        self
    }

    /// Set the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = Some(prefix.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
