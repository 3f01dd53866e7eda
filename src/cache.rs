//! Time-to-live cache over spreadsheet reads.
//!
//! Remote reads are expensive and rate-limited, so the data layer keeps the
//! results around for a while. The cache itself is a plain map; callers own
//! the synchronization (the `DataManager` keeps each cache behind a
//! `tokio::sync::RwLock` and is the only component that touches it).

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default entry lifetime: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry<V> {
    value: V,
    expires: Instant,
}

/// A string-keyed cache whose entries expire at an absolute deadline.
///
/// An expired entry is never returned: `get` checks the deadline on every
/// read, so a stale value cannot be observed even before the entry is
/// physically removed.
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<V> TtlCache<V> {
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    /// Returns the cached value, or `None` if absent or past expiry.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires)
            .map(|entry| &entry.value)
    }

    /// Stores `value` with the default TTL.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    /// Stores `value` with expiry = now + `ttl`.
    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires: Instant::now() + ttl,
            },
        );
    }

    /// Removes one key. Removing an absent key is a no-op.
    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Clears the entire cache.
    #[allow(dead_code)]
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
