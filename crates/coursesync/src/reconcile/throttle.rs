//! Limit/interval throttle for calls to the registrar.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Caps concurrent calls at `limit`, and holds each slot for at least
/// `interval` after the call it admitted started, so no slot admits more
/// than one call per interval.
///
/// Cloning shares the underlying slots.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    slots: Arc<Semaphore>,
    limit: usize,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, interval: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
            interval,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `fut` once a slot is free.
    ///
    /// The caller gets the result as soon as `fut` completes; the slot is
    /// released in the background once the interval has elapsed.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // Acquire only fails on a closed semaphore, and this one is never closed.
        let permit = self.slots.clone().acquire_owned().await.ok();
        let started = Instant::now();

        let output = fut.await;

        if let Some(permit) = permit {
            let release_at = started + self.interval;
            if Instant::now() >= release_at {
                drop(permit);
            } else {
                tokio::spawn(async move {
                    tokio::time::sleep_until(release_at).await;
                    drop(permit);
                });
            }
        }

        output
    }
}

impl Default for RateLimiter {
    /// Two concurrent calls, each slot admitting one call per 50ms.
    fn default() -> Self {
        Self::new(2, Duration::from_millis(50))
    }
}
