use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::metrics::RATE_LIMIT_KEYS;

// Rate limit key - hashed API key + client IP
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub api_key_hash: String,
    pub client_ip: String,
}

impl RateLimitKey {
    pub fn new(api_key_hash: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            api_key_hash: api_key_hash.into(),
            client_ip: client_ip.into(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.api_key_hash.get(..8).unwrap_or(&self.api_key_hash);
        write!(f, "{}...@{}", short, self.client_ip)
    }
}

// Rate limit entry - request timestamps, oldest first
#[derive(Debug, Default)]
pub struct RateLimitEntry {
    timestamps: VecDeque<Instant>,
}

impl RateLimitEntry {
    // drop everything that left the window
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Sliding-window request limiter keyed by (API key hash, client IP).
///
/// A key may make at most `max_requests` requests within any `window`.
/// Expired timestamps are purged lazily whenever a key is looked at; the
/// table itself only shrinks through [`RateLimiter::clear_expired`].
pub struct RateLimiter {
    entries: DashMap<RateLimitKey, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn is_allowed(&self, key: &RateLimitKey) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    pub fn is_allowed_at(&self, key: &RateLimitKey, now: Instant) -> bool {
        // the entry guard holds the shard lock, so evict + append is atomic per key
        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.evict(now, self.window);

        if entry.len() >= self.max_requests as usize {
            tracing::warn!("Rate limit exceeded for {}", key);
            return false;
        }

        entry.timestamps.push_back(now);
        tracing::debug!("Request allowed for {} ({}/{})", key, entry.len(), self.max_requests);
        true
    }

    pub fn get_remaining_requests(&self, key: &RateLimitKey) -> u32 {
        self.get_remaining_requests_at(key, Instant::now())
    }

    pub fn get_remaining_requests_at(&self, key: &RateLimitKey, now: Instant) -> u32 {
        let used = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.evict(now, self.window);
                entry.len()
            }
            None => 0,
        };
        (self.max_requests as usize).saturating_sub(used) as u32
    }

    // Instant at which the oldest recorded request frees its slot
    pub fn get_reset_time(&self, key: &RateLimitKey) -> Instant {
        self.get_reset_time_at(key, Instant::now())
    }

    pub fn get_reset_time_at(&self, key: &RateLimitKey, now: Instant) -> Instant {
        let oldest = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.evict(now, self.window);
                entry.timestamps.front().copied()
            }
            None => None,
        };
        oldest.map(|oldest| oldest + self.window).unwrap_or(now)
    }

    /// Evicts expired timestamps everywhere and drops keys left empty.
    /// Returns how many keys were removed.
    pub fn clear_expired(&self) -> usize {
        self.clear_expired_at(Instant::now())
    }

    pub fn clear_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.evict(now, self.window);
            !entry.is_empty()
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Cleared {} expired rate limit entries", removed);
        }
        removed
    }
}

// Sweeper - drops empty entries every `sweep_interval`
pub async fn rate_limit_sweeper(rate_limiter: Arc<RateLimiter>, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    tracing::info!("Rate limit sweeper started (interval: {:?})", sweep_interval);

    loop {
        interval.tick().await;
        rate_limiter.clear_expired();
        RATE_LIMIT_KEYS.set(rate_limiter.tracked_keys() as f64);
    }
}
