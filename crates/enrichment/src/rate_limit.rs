//! Sliding-window rate limiter for outbound oracle calls

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use screener_core::RateLimitConfig;

/// Bounds outbound request rate: no more than `max_requests` grants fall
/// within any trailing `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests.max(1),
            window: Duration::from_millis(config.window_ms),
            grants: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until the sliding window has a free slot, then take it.
    ///
    /// Suspends only the calling task; the lock is never held across an
    /// await point.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut grants = self.grants.lock();
                let now = Instant::now();
                Self::prune(&mut grants, now, self.window);

                if grants.len() < self.max_requests {
                    grants.push_back(now);
                    return;
                }

                // Window is full; the oldest grant decides when a slot
                // frees up.
                match grants.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };

            debug!("Rate limit window full, waiting {:?}", wait_until - Instant::now());
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let mut grants = self.grants.lock();
        let now = Instant::now();
        Self::prune(&mut grants, now, self.window);

        if grants.len() < self.max_requests {
            grants.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of grants currently inside the window.
    pub fn in_flight(&self) -> usize {
        let mut grants = self.grants.lock();
        Self::prune(&mut grants, Instant::now(), self.window);
        grants.len()
    }

    fn prune(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = grants.front() {
            if now.duration_since(*front) >= window {
                grants.pop_front();
            } else {
                break;
            }
        }
    }
}
