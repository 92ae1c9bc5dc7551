//! Bounded result cache with per-entry TTL and LRU eviction.
//!
//! All entries live in one map behind a reader/writer lock. Lookups take
//! the read lock, so reads of different keys proceed concurrently; they
//! record recency in an atomic tick instead of mutating the map. Inserts,
//! expiry removal and eviction take the write lock, which makes every write
//! exclusive with every read of the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};

/// Source of time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    ttl: Duration,
    last_access: AtomicU64,
}

impl<V> Entry<V> {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted) > self.ttl
    }
}

/// A string-keyed cache holding at most `capacity` values.
pub struct ResultCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    capacity: usize,
    default_ttl: Duration,
    tick: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self::with_clock(capacity, default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            default_ttl,
            tick: AtomicU64::new(0),
            clock,
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The value stored under `key`, unless it is absent or older than its
    /// TTL. Expired entries are removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.expired(now) => {
                    entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: remove under the write lock, re-checking in case a
        // writer replaced the entry in between.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.expired(now)) {
            entries.remove(key);
            debug!(key, "cache entry expired");
        }
        None
    }

    /// Store `value` under `key` with the cache's default TTL.
    pub fn put(&self, key: &str, value: V) -> Result<()> {
        self.put_with_ttl(key, value, self.default_ttl)
    }

    /// Store `value` under `key`. When the cache is full and `key` is new,
    /// the least recently used entry is evicted first.
    pub fn put_with_ttl(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Cache {
                message: "cache capacity is zero".to_string(),
            });
        }
        let entry = Entry {
            value,
            inserted: self.clock.now(),
            ttl,
            last_access: AtomicU64::new(self.next_tick()),
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let lru = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(lru) = lru {
                entries.remove(&lru);
                debug!(evicted = %lru, "cache full, evicted least recently used entry");
            }
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> (ResultCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = ResultCache::with_clock(capacity, Duration::from_secs(300), clock.clone());
        (cache, clock)
    }

    #[test]
    fn read_after_write_within_ttl_hits() {
        let (cache, clock) = cache(4);
        cache.put("q", 7).unwrap();
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("q"), Some(7));
    }

    #[test]
    fn read_after_ttl_misses_and_removes() {
        let (cache, clock) = cache(4);
        cache.put_with_ttl("q", 7, Duration::from_secs(10)).unwrap();
        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.get("q"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evicts_exactly_the_least_recently_used() {
        let (cache, _) = cache(3);
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        cache.put("c", 3).unwrap();
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get("a"), Some(1));
        cache.put("d", 4).unwrap();

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn never_exceeds_capacity() {
        let (cache, _) = cache(5);
        for i in 0..50u32 {
            cache.put(&format!("k{i}"), i).unwrap();
            assert!(cache.len() <= 5);
        }
        // The five most recent survive.
        for i in 45..50u32 {
            assert_eq!(cache.get(&format!("k{i}")), Some(i));
        }
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let (cache, _) = cache(2);
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        cache.put("a", 10).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn invalidate_all_empties_the_cache() {
        let (cache, _) = cache(2);
        cache.put("a", 1).unwrap();
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn zero_capacity_is_a_cache_error() {
        let (cache, _) = cache(0);
        assert!(matches!(cache.put("a", 1), Err(Error::Cache { .. })));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let cache = Arc::new(ResultCache::<u64>::new(16, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        let key = format!("k{}", (t * 7 + i) % 32);
                        if i % 3 == 0 {
                            cache.put(&key, i).unwrap();
                        } else {
                            let _ = cache.get(&key);
                        }
                        assert!(cache.len() <= 16);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }
}
