use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Rolling-window start limiter: at most `limit` acquisitions in any span of
/// `window`. A `limit` of zero disables the limiter.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            starts: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Record a start at `now` if the window has room, otherwise report how
    /// long until the oldest start leaves the window.
    pub fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        if self.limit == 0 {
            return Ok(());
        }
        let mut starts = self.starts.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(&oldest) = starts.front() {
            if now.duration_since(oldest) >= self.window {
                starts.pop_front();
            } else {
                break;
            }
        }
        if starts.len() < self.limit {
            starts.push_back(now);
            return Ok(());
        }
        let oldest = starts[0];
        Err(self.window - now.duration_since(oldest))
    }

    /// Wait until a start is allowed, then record it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire(Instant::now()) {
                Ok(()) => return,
                Err(wait) => sleep(wait).await,
            }
        }
    }
}
