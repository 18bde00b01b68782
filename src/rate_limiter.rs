//! Request rate limiting for the metadata API
//!
//! WorldCat enforces a per-key request quota. The limiter spaces requests evenly at
//! the configured rate instead of letting them burst, so a long batch never trips the
//! remote limit in its first second and then stalls.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared request limiter
///
/// Each call to [`acquire`](Self::acquire) reserves the next free slot on a timeline
/// where slots are `1 / requests_per_second` apart, then sleeps until that slot.
///
/// # Implementation
///
/// Lock-free over two atomics:
/// - `limit_rps`: requests per second (0 = unlimited)
/// - `next_slot`: earliest time the next request may start (nanoseconds since the limiter's epoch)
#[derive(Clone)]
pub struct RequestRateLimiter {
    limit_rps: Arc<AtomicU32>,
    next_slot: Arc<AtomicU64>,
    epoch: Instant,
}

impl RequestRateLimiter {
    /// Create a limiter allowing `requests_per_second` (None or 0 = unlimited)
    ///
    /// # Examples
    ///
    /// ```
    /// use bibrecord_dl::rate_limiter::RequestRateLimiter;
    ///
    /// let limiter = RequestRateLimiter::new(Some(10));
    /// assert_eq!(limiter.limit(), Some(10));
    ///
    /// let unlimited = RequestRateLimiter::new(None);
    /// assert_eq!(unlimited.limit(), None);
    /// ```
    #[must_use]
    pub fn new(requests_per_second: Option<u32>) -> Self {
        Self {
            limit_rps: Arc::new(AtomicU32::new(requests_per_second.unwrap_or(0))),
            next_slot: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
        }
    }

    /// Change the rate; takes effect for the next reservation
    pub fn set_limit(&self, requests_per_second: Option<u32>) {
        self.limit_rps
            .store(requests_per_second.unwrap_or(0), Ordering::SeqCst);
    }

    /// Current rate, `None` when unlimited
    pub fn limit(&self) -> Option<u32> {
        match self.limit_rps.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Wait until the caller may issue one request
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis(), "rate limiter delaying request");
            tokio::time::sleep(wait).await;
        }
    }

    /// Reserve the next slot and return how long to wait for it
    fn reserve(&self) -> Duration {
        let limit = self.limit_rps.load(Ordering::Relaxed);
        if limit == 0 {
            return Duration::ZERO;
        }

        let interval = 1_000_000_000 / u64::from(limit);
        let now = self.now_nanos();

        let mut current = self.next_slot.load(Ordering::Acquire);
        loop {
            let slot = current.max(now);
            match self.next_slot.compare_exchange_weak(
                current,
                slot + interval,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Duration::from_nanos(slot - now),
                Err(actual) => current = actual,
            }
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("limit_rps", &self.limit())
            .finish()
    }
}
