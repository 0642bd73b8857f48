use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relay_core::{Clock, SystemClock};
use serde::Serialize;
use tracing::debug;

use crate::CacheError;

/// TTL applied by [`TtlCache::set_default`] unless overridden.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct Entries<V> {
    map: HashMap<String, CacheEntry<V>>,
    /// Ordered copy of every live key, for prefix eviction.
    index: BTreeSet<String>,
}

impl<V> Entries<V> {
    fn remove(&mut self, key: &str) -> bool {
        self.index.remove(key);
        self.map.remove(key).is_some()
    }
}

/// Hit/miss counters plus the current key count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

/// Expiring key/value store.
///
/// Values are shared, never copied: callers must treat what they get back
/// as immutable and clone it themselves before changing it.
pub struct TtlCache<V> {
    name: &'static str,
    entries: RwLock<Entries<V>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> TtlCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    pub fn with_clock(name: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                index: BTreeSet::new(),
            }),
            clock,
            default_ttl: DEFAULT_TTL,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live entry. An entry at or past its expiry is reported
    /// absent and dropped on the spot.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.map.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.value));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock, a concurrent `set` may
        // have refreshed it.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.map.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.value));
            }
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite `key`, resetting its expiry to `now + ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        self.set_arc(key, Arc::clone(&value), ttl);
        value
    }

    pub fn set_default(&self, key: impl Into<String>, value: V) -> Arc<V> {
        self.set(key, value, self.default_ttl)
    }

    pub fn set_arc(&self, key: impl Into<String>, value: Arc<V>, ttl: Duration) {
        let key = key.into();
        let expires_at = self.expires_at(ttl);

        let mut entries = self.entries.write();
        entries.index.insert(key.clone());
        entries.map.insert(key, CacheEntry { value, expires_at });
    }

    /// Remove `key`. Returns whether anything was there (expired or not).
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key)
    }

    /// Remove every key matching `pattern`.
    ///
    /// `listing:t1:*` removes all keys starting with `listing:t1:`; a
    /// pattern without `*` removes exactly that key. Returns the number of
    /// keys removed.
    pub fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        match pattern.find('*') {
            None => Ok(usize::from(self.delete(pattern))),
            Some(pos) if pos + 1 == pattern.len() => Ok(self.delete_prefix(&pattern[..pos])),
            Some(_) => Err(CacheError::UnsupportedPattern(pattern.to_string())),
        }
    }

    /// Remove every key starting with `prefix`, taken literally: a `*`
    /// inside it is an ordinary character.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let doomed: Vec<String> = entries
            .index
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect();

        for key in &doomed {
            entries.remove(key);
        }

        debug!(cache = self.name, prefix, removed = doomed.len(), "prefix eviction");
        doomed.len()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let expired: Vec<String> = entries
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.remove(key);
        }
        expired.len()
    }

    pub fn flush_all(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.index.clear();
    }

    /// Stored keys, including expired ones the sweeper has not reached yet.
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.len(),
        }
    }

    fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
