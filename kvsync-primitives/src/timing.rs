//! Lease math and the polling loop behind every blocking call.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{SyncError, SyncResult};

/// Lease and polling settings copied into each primitive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub default_lease: Duration,
    pub poll_interval: Duration,
}

impl Timing {
    /// Whole seconds to send to the store for a lease, rounded up.
    pub fn lease_secs(&self, lease: Option<Duration>) -> SyncResult<u64> {
        let lease = lease.unwrap_or(self.default_lease);
        if lease.is_zero() {
            return Err(SyncError::invalid_argument("lease must be positive"));
        }
        Ok(lease.as_millis().div_ceil(1000) as u64)
    }

    /// Run `attempt` until it succeeds or `wait` elapses.
    ///
    /// `wait == None` waits forever, as does a wait too large to add to the
    /// current instant (`Duration::MAX`). A zero wait makes exactly one
    /// attempt.
    /// The sleep between attempts is the fixed poll interval; there is no
    /// queue, so whichever waiter polls first after a release wins.
    pub async fn poll<F, Fut>(&self, wait: Option<Duration>, mut attempt: F) -> SyncResult<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<bool>>,
    {
        // A wait too long to represent as an instant means no deadline
        let deadline = wait.and_then(|w| Instant::now().checked_add(w));
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if attempt().await? {
                return Ok(true);
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                trace!(attempts = attempts, "Wait deadline elapsed");
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
