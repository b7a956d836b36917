//! TTL-stamped read-through cache for backend-owned catalogs.
//!
//! The cache never fetches by itself. Callers look a key up, and on
//! `Missing` or `Stale` they fetch and `set` the replacement. A stale value
//! stays readable until that replacement lands, so readers never wait on a
//! refresh in progress.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for cache ages
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Fresh(V),
    /// Present but older than the TTL; still usable if a refresh fails
    Stale(V),
    Missing,
}

impl<V> Lookup<V> {
    pub fn fresh(self) -> Option<V> {
        match self {
            Lookup::Fresh(value) => Some(value),
            _ => None,
        }
    }

    /// Any cached value, fresh or not
    pub fn any(self) -> Option<V> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale(value) => Some(value),
            Lookup::Missing => None,
        }
    }
}

struct Entry<V> {
    value: V,
    fetched_at: Instant,
    ttl: Duration,
}

pub struct MetadataCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> Default for MetadataCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> MetadataCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Look up `key`; it is stale once its age exceeds the smaller of `ttl`
    /// and the TTL it was stored with.
    pub fn get(&self, key: &str, ttl: Duration) -> Lookup<V> {
        let entries = self.entries.read();
        let Some(entry) = entries.get(key) else {
            return Lookup::Missing;
        };

        let age = self.clock.now().saturating_duration_since(entry.fetched_at);
        if age > ttl.min(entry.ttl) {
            Lookup::Stale(entry.value.clone())
        } else {
            Lookup::Fresh(entry.value.clone())
        }
    }

    /// Replace the whole value for `key` (last writer wins)
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            fetched_at: self.clock.now(),
            ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    pub fn age(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read();
        entries
            .get(key)
            .map(|entry| self.clock.now().saturating_duration_since(entry.fetched_at))
    }
}
