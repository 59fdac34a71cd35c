//! Sliding-window rate limiting.
//!
//! Each key holds the timestamps of its admitted requests within the
//! window. A denied request learns exactly how long until the oldest
//! timestamp slides out, which becomes the `Retry-After` value.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Requests admitted per key per window.
    pub limit: u32,
    pub period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            period: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

pub struct SlidingWindowLimiter {
    config: RateLimiterConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or deny one request for the key.
    ///
    /// Check and record are one step under the lock, so concurrent requests
    /// for the same key cannot both squeeze into the last slot.
    pub fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(key.to_string()).or_default();

        while let Some(oldest) = window.front() {
            if *oldest + self.config.period <= now {
                window.pop_front();
            } else {
                break;
            }
        }

        if (window.len() as u32) < self.config.limit {
            window.push_back(now);
            return Decision::Allowed;
        }

        // Full window; the front entry is the next to expire
        let retry_after = window
            .front()
            .map(|oldest| (*oldest + self.config.period).saturating_duration_since(now))
            .unwrap_or(self.config.period);
        Decision::Denied { retry_after }
    }

    /// Drop keys whose whole window has expired.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, window| {
            window
                .back()
                .map(|latest| *latest + self.config.period > now)
                .unwrap_or(false)
        });
        before - windows.len()
    }
}
