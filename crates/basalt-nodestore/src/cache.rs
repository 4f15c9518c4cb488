//! Positive and negative lookup caches.
//!
//! Every store façade (and every shard) keeps a pair: a positive cache of
//! recently seen objects and a negative cache of hashes known absent.
//! Both are bounded by a target size and a target age; `sweep` enforces
//! the bounds, fetches refresh entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use basalt_ids::Hash;
use basalt_ledger::NodeObject;
use parking_lot::Mutex;

struct CacheEntry {
    object: Arc<NodeObject>,
    last_access: Instant,
}

/// A positive cache mapping hash to object.
pub struct NodeCache {
    name: String,
    entries: Mutex<HashMap<Hash, CacheEntry>>,
    target_size: AtomicUsize,
    target_age: Mutex<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeCache {
    /// Creates a cache with the given bounds.
    #[must_use]
    pub fn new(name: &str, target_size: usize, target_age: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entries: Mutex::new(HashMap::new()),
            target_size: AtomicUsize::new(target_size),
            target_age: Mutex::new(target_age),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Returns the cache name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an object, refreshing its age on a hit.
    #[must_use]
    pub fn fetch(&self, hash: &Hash) -> Option<Arc<NodeObject>> {
        let mut entries = self.entries.lock();
        match entries.get_mut(hash) {
            Some(entry) => {
                entry.last_access = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.object.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts an object, returning the canonical shared instance.
    ///
    /// If the hash is already cached the existing object wins, so every
    /// concurrent reader ends up holding the same allocation.
    #[must_use]
    pub fn canonicalize(&self, hash: Hash, object: Arc<NodeObject>) -> Arc<NodeObject> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(hash).or_insert(CacheEntry {
            object,
            last_access: Instant::now(),
        });
        entry.last_access = Instant::now();
        entry.object.clone()
    }

    /// Removes an entry.
    pub fn erase(&self, hash: &Hash) {
        self.entries.lock().remove(hash);
    }

    /// Evicts entries older than the target age, then trims the oldest
    /// entries until the cache fits its target size.
    pub fn sweep(&self) {
        let age = *self.target_age.lock();
        let target = self.target_size.load(Ordering::Relaxed);
        let now = Instant::now();

        let mut entries = self.entries.lock();
        entries.retain(|_, entry| now.duration_since(entry.last_access) <= age);
        if entries.len() > target {
            let mut by_age: Vec<(Hash, Instant)> = entries
                .iter()
                .map(|(hash, entry)| (*hash, entry.last_access))
                .collect();
            by_age.sort_by_key(|&(_, at)| at);
            let excess = entries.len() - target;
            for (hash, _) in by_age.into_iter().take(excess) {
                entries.remove(&hash);
            }
        }
    }

    /// Sets the target entry count.
    pub fn set_target_size(&self, size: usize) {
        self.target_size.store(size, Ordering::Relaxed);
    }

    /// Returns the target entry count.
    #[must_use]
    pub fn target_size(&self) -> usize {
        self.target_size.load(Ordering::Relaxed)
    }

    /// Sets the target age and returns the previous value.
    pub fn set_target_age(&self, age: Duration) -> Duration {
        std::mem::replace(&mut *self.target_age.lock(), age)
    }

    /// Returns the current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Hits as a fraction of all lookups.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A negative cache: hashes known to be absent from storage.
pub struct KeyCache {
    entries: Mutex<HashMap<Hash, Instant>>,
    target_size: AtomicUsize,
    target_age: Mutex<Duration>,
}

impl KeyCache {
    /// Creates a cache with the given bounds.
    #[must_use]
    pub fn new(target_size: usize, target_age: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            target_size: AtomicUsize::new(target_size),
            target_age: Mutex::new(target_age),
        })
    }

    /// Marks a hash as absent.
    pub fn insert(&self, hash: Hash) {
        self.entries.lock().insert(hash, Instant::now());
    }

    /// Returns true if the hash is known absent, refreshing its age.
    #[must_use]
    pub fn touch_if_exists(&self, hash: &Hash) -> bool {
        match self.entries.lock().get_mut(hash) {
            Some(at) => {
                *at = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Forgets a hash, typically because it was just stored.
    pub fn erase(&self, hash: &Hash) {
        self.entries.lock().remove(hash);
    }

    /// Evicts stale entries and trims to the target size.
    pub fn sweep(&self) {
        let age = *self.target_age.lock();
        let target = self.target_size.load(Ordering::Relaxed);
        let now = Instant::now();

        let mut entries = self.entries.lock();
        entries.retain(|_, at| now.duration_since(*at) <= age);
        if entries.len() > target {
            let mut by_age: Vec<(Hash, Instant)> =
                entries.iter().map(|(hash, at)| (*hash, *at)).collect();
            by_age.sort_by_key(|&(_, at)| at);
            let excess = entries.len() - target;
            for (hash, _) in by_age.into_iter().take(excess) {
                entries.remove(&hash);
            }
        }
    }

    /// Sets the target entry count.
    pub fn set_target_size(&self, size: usize) {
        self.target_size.store(size, Ordering::Relaxed);
    }

    /// Sets the target age.
    pub fn set_target_age(&self, age: Duration) {
        *self.target_age.lock() = age;
    }

    /// Returns the current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// The cache pair every fetch path consults.
#[derive(Clone)]
pub struct CachePair {
    /// Positive cache.
    pub positive: Arc<NodeCache>,
    /// Negative cache.
    pub negative: Arc<KeyCache>,
}

impl CachePair {
    /// Creates a pair sharing the given bounds.
    #[must_use]
    pub fn new(name: &str, target_size: usize, target_age: Duration) -> Self {
        Self {
            positive: NodeCache::new(name, target_size, target_age),
            negative: KeyCache::new(target_size, target_age),
        }
    }

    /// Applies new bounds to both caches.
    pub fn tune(&self, target_size: usize, target_age: Duration) {
        self.positive.set_target_size(target_size);
        let _ = self.positive.set_target_age(target_age);
        self.negative.set_target_size(target_size);
        self.negative.set_target_age(target_age);
    }

    /// Sweeps both caches.
    pub fn sweep(&self) {
        self.positive.sweep();
        self.negative.sweep();
    }
}

#[cfg(test)]
mod tests {
    use basalt_ledger::NodeType;

    use super::*;

    fn object(byte: u8) -> Arc<NodeObject> {
        NodeObject::compute(NodeType::Leaf, vec![byte])
    }

    #[test]
    fn test_canonicalize_returns_first_instance() {
        let cache = NodeCache::new("test", 16, Duration::from_secs(60));
        let first = object(1);
        let second = object(1);
        assert_eq!(first.hash(), second.hash());

        let canonical = cache.canonicalize(*first.hash(), first.clone());
        assert!(Arc::ptr_eq(&canonical, &first));
        let canonical = cache.canonicalize(*second.hash(), second.clone());
        assert!(Arc::ptr_eq(&canonical, &first));
        assert!(!Arc::ptr_eq(&canonical, &second));
    }

    #[test]
    fn test_fetch_and_hit_rate() {
        let cache = NodeCache::new("test", 16, Duration::from_secs(60));
        let obj = object(2);
        assert!(cache.fetch(obj.hash()).is_none());
        let _ = cache.canonicalize(*obj.hash(), obj.clone());
        assert!(cache.fetch(obj.hash()).is_some());
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sweep_enforces_size() {
        let cache = NodeCache::new("test", 4, Duration::from_secs(60));
        for i in 0..10 {
            let obj = object(i);
            let _ = cache.canonicalize(*obj.hash(), obj);
        }
        assert_eq!(cache.len(), 10);
        cache.sweep();
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_sweep_enforces_age() {
        let cache = NodeCache::new("test", 16, Duration::ZERO);
        let obj = object(3);
        let _ = cache.canonicalize(*obj.hash(), obj);
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_target_age_returns_previous() {
        let cache = NodeCache::new("test", 16, Duration::from_secs(300));
        let prev = cache.set_target_age(Duration::from_secs(1));
        assert_eq!(prev, Duration::from_secs(300));
        let prev = cache.set_target_age(prev);
        assert_eq!(prev, Duration::from_secs(1));
    }

    #[test]
    fn test_key_cache_touch() {
        let cache = KeyCache::new(16, Duration::from_secs(60));
        let hash = Hash::digest(b"absent");
        assert!(!cache.touch_if_exists(&hash));
        cache.insert(hash);
        assert!(cache.touch_if_exists(&hash));
        cache.erase(&hash);
        assert!(!cache.touch_if_exists(&hash));
    }

    #[test]
    fn test_key_cache_sweep() {
        let cache = KeyCache::new(2, Duration::from_secs(60));
        for i in 0..5u8 {
            cache.insert(Hash::digest(&[i]));
        }
        cache.sweep();
        assert_eq!(cache.len(), 2);
    }
}
