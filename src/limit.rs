//! Per-caller request throttling
//!
//! Sliding-window limiter over in-memory timestamps. Each endpoint that
//! throttles owns its own limiter, so upload and ask quotas never interact.
//! Keys are opaque strings: an authenticated user id, or a network origin
//! for anything unauthenticated.
//!
//! Memory stays bounded two ways: expired keys are swept every
//! `CLEANUP_INTERVAL` checks, and the map holds at most `MAX_TRACKED_KEYS`
//! entries. A new key arriving at the cap forces a sweep and is rejected if
//! the map is still full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Sweep expired entries every this many checks.
const CLEANUP_INTERVAL: u64 = 100;

/// Hard cap on distinct keys held in memory.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Sliding-window rate limiter, one instance per throttled endpoint.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: RwLock<HashMap<String, Vec<Instant>>>,
    check_count: AtomicU64,
}

impl RateLimiter {
    /// A limiter allowing `per_minute` requests per key in any 60s window.
    pub fn per_minute(per_minute: u32) -> Self {
        Self {
            max_requests: per_minute,
            window: Duration::from_secs(60),
            state: RwLock::new(HashMap::new()),
            check_count: AtomicU64::new(0),
        }
    }

    /// Record one request for `key`, or fail with `Error::RateLimited` when
    /// the window is full. Rejected requests are not recorded.
    pub fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or(now);

        let count = self.check_count.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % CLEANUP_INTERVAL == 0 {
            debug!(check_count = count, "Sweeping expired rate limit entries");
            self.sweep(cutoff);
        }

        let mut state = self.state.write();

        if !state.contains_key(key) && state.len() >= MAX_TRACKED_KEYS {
            // Full map and an unknown key: sweep in place, then give up
            state.retain(|_, stamps| {
                stamps.retain(|&t| t > cutoff);
                !stamps.is_empty()
            });
            if state.len() >= MAX_TRACKED_KEYS {
                warn!(tracked = state.len(), "Rate limiter key table full");
                return Err(Error::RateLimited);
            }
        }

        let stamps = state.entry(key.to_string()).or_default();
        stamps.retain(|&t| t > cutoff);

        if stamps.len() >= self.max_requests as usize {
            warn!(key = %key, requests = stamps.len(), "Rate limit exceeded");
            return Err(Error::RateLimited);
        }

        stamps.push(now);
        Ok(())
    }

    fn sweep(&self, cutoff: Instant) {
        let mut state = self.state.write();
        state.retain(|_, stamps| {
            stamps.retain(|&t| t > cutoff);
            !stamps.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.state.read().len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
