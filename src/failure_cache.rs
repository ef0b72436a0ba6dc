//! Memory of address ranges the device refused to bulk-read
//!
//! Lookups happen on every poll; eviction only runs from [`FailureCache::sweep`],
//! which is rate-limited to its own interval so a device that flaps many
//! ranges cannot grow the map without bound. Expiry is still exact: an entry
//! older than the TTL no longer counts even before it is swept.

use crate::planner::BlockKey;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct FailureCache {
    entries: HashMap<BlockKey, Instant>,
    ttl: Duration,
    sweep_interval: Duration,
    last_swept: Instant,
}

impl Default for FailureCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL)
    }
}

impl FailureCache {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            sweep_interval,
            last_swept: Instant::now(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remember that a bulk read of `key` was rejected at `now`
    pub fn record(&mut self, key: BlockKey, now: Instant) {
        self.entries.insert(key, now);
    }

    /// Whether bulk reads of `key` should still be skipped at `now`
    pub fn is_failed(&self, key: BlockKey, now: Instant) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|failed_at| now.saturating_duration_since(*failed_at) < self.ttl)
    }

    pub fn failed_at(&self, key: BlockKey) -> Option<Instant> {
        self.entries.get(&key).copied()
    }

    /// Evict expired entries if the sweep interval has passed since the
    /// last sweep. Returns the number of evicted entries.
    pub fn sweep(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_swept) < self.sweep_interval {
            return 0;
        }
        self.last_swept = now;
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, failed_at| now.saturating_duration_since(*failed_at) < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.entries.keys()
    }
}
