//! Outbound request throttle
//!
//! View refreshes fan out (four count queries, folder tree and mail list at
//! once) and job pollers run alongside them, so every request of one client
//! passes through a single token bucket.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by all clones of one API client
#[derive(Clone)]
pub struct RequestRateLimiter {
    limiter: Arc<DirectLimiter>,
    per_second: NonZeroU32,
}

impl RequestRateLimiter {
    /// `requests_per_second` of zero is treated as one
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            per_second,
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second.get()
    }

    /// Wait for a slot. Only throttled requests are logged.
    pub async fn wait(&self) {
        if self.limiter.check().is_ok() {
            return;
        }
        let started = Instant::now();
        self.limiter.until_ready().await;
        debug!(
            "Request throttled for {:?} ({} req/s limit)",
            started.elapsed(),
            self.per_second
        );
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::new(20)
    }
}
