//! Intake throttles
//!
//! `DedupCache` drops a `(token, chain)` seen again inside the dedup
//! window. `ExecutionRateLimiter` caps executions per rolling minute.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup window (5 minutes)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Default max tracked keys before cleanup
pub const DEFAULT_MAX_DEDUP_ENTRIES: usize = 10_000;

/// Default executions per minute
pub const DEFAULT_MAX_EXECUTIONS_PER_MINUTE: u32 = 10;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// `(token, chain)` keys with a TTL
#[derive(Debug)]
pub struct DedupCache {
    entries: HashMap<(String, String), Instant>,
    window: Duration,
    max_entries: usize,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_MAX_DEDUP_ENTRIES)
    }

    pub fn with_capacity(window: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            max_entries: max_entries.max(1),
        }
    }

    /// Record the key. Returns false if it was already seen inside the window.
    pub fn check_and_insert(&mut self, token: &str, chain_id: &str) -> bool {
        self.check_and_insert_at(token, chain_id, Instant::now())
    }

    fn check_and_insert_at(&mut self, token: &str, chain_id: &str, now: Instant) -> bool {
        let key = (token.to_string(), chain_id.to_string());
        if let Some(seen) = self.entries.get(&key) {
            if now.saturating_duration_since(*seen) < self.window {
                return false;
            }
        }

        if self.entries.len() >= self.max_entries {
            self.cleanup(now);
        }
        if self.entries.len() >= self.max_entries {
            self.remove_oldest();
        }

        self.entries.insert(key, now);
        true
    }

    /// Drop expired keys
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        before - self.entries.len()
    }

    fn remove_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, seen)| **seen)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed one-minute window execution limiter
#[derive(Debug)]
pub struct ExecutionRateLimiter {
    per_minute: u32,
    in_window: u32,
    window_start: Instant,
}

impl ExecutionRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute: per_minute.max(1),
            in_window: 0,
            window_start: Instant::now(),
        }
    }

    /// Take a slot, or return how long until the window resets
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= RATE_WINDOW {
            self.window_start = now;
            self.in_window = 0;
        }

        if self.in_window >= self.per_minute {
            return Err(RATE_WINDOW.saturating_sub(now.saturating_duration_since(self.window_start)));
        }

        self.in_window += 1;
        Ok(())
    }
}
