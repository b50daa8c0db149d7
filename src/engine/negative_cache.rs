//! Negative cache of unquotable pairs.
//!
//! Remembers directional (input, output) pairs that the upstream rejected
//! as unroutable so they are skipped until the TTL elapses. Expiry is
//! decided lazily at read time; `purge_expired` only bounds memory.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::types::PairKey;

/// Default time a failed pair stays suppressed.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

pub struct NegativeCache {
    ttl: Duration,
    entries: DashMap<PairKey, Instant>,
}

impl Default for NegativeCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_suppressed(&self, key: &PairKey) -> bool {
        self.is_suppressed_at(key, Instant::now())
    }

    /// True while `now - last_failure < ttl`.
    pub fn is_suppressed_at(&self, key: &PairKey, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(failed_at) => now.saturating_duration_since(*failed_at) < self.ttl,
            None => false,
        }
    }

    pub fn mark_failed(&self, key: PairKey) {
        self.mark_failed_at(key, Instant::now());
    }

    /// Record a failure at `now`. Last writer wins.
    pub fn mark_failed_at(&self, key: PairKey, now: Instant) {
        debug!(pair = %key, ttl_secs = self.ttl.as_secs(), "Pair added to negative cache");
        self.entries.insert(key, now);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, failed_at| now.saturating_duration_since(*failed_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
