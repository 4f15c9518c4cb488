//! Shared store façade plumbing.
//!
//! Both façades ([`RotatingStore`](crate::RotatingStore) and
//! [`ShardStore`](crate::ShardStore)) share one fetch pipeline: consult
//! the cache pair, then the backing storage, canonicalizing hits and
//! negative-caching misses. Reads can also be posted asynchronously; a
//! small pool of read threads drains them in key order so the backend
//! sees mostly-sequential access.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use basalt_ids::Hash;
use basalt_ledger::{Ledger, NodeObject, NodeSource, NodeType};
use parking_lot::{Condvar, Mutex};
use tracing::{error, trace, warn};

use crate::backend::Backend;
use crate::cache::CachePair;
use crate::error::{BackendError, StoreError};

/// Default target entry count for each cache.
pub const CACHE_TARGET_SIZE: usize = 16384;

/// Default target age for cache entries.
pub const CACHE_TARGET_AGE: Duration = Duration::from_secs(300);

/// Floor for a single shard's cache target when the aggregate budget is
/// split across many shards.
pub const MIN_SHARD_CACHE_SIZE: usize = 4096;

/// Fraction of the positive cache a client may fill with async reads.
pub(crate) const ASYNC_DIVIDER: usize = 8;

/// Objects per backend write during bulk import.
pub(crate) const BATCH_WRITE_LIMIT: usize = 256;

/// Read and write counters shared by a store façade.
#[derive(Debug, Default)]
pub struct StoreStats {
    store_count: AtomicU64,
    store_size: AtomicU64,
    fetch_total_count: AtomicU64,
    fetch_hit_count: AtomicU64,
    fetch_size: AtomicU64,
}

impl StoreStats {
    pub(crate) fn note_store(&self, size: usize) {
        self.store_count.fetch_add(1, Ordering::Relaxed);
        self.store_size.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn note_fetch(&self) {
        self.fetch_total_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_fetch_hit(&self, size: usize) {
        self.fetch_hit_count.fetch_add(1, Ordering::Relaxed);
        self.fetch_size.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Number of objects stored.
    #[must_use]
    pub fn store_count(&self) -> u64 {
        self.store_count.load(Ordering::Relaxed)
    }

    /// Total bytes stored.
    #[must_use]
    pub fn store_size(&self) -> u64 {
        self.store_size.load(Ordering::Relaxed)
    }

    /// Number of fetches that reached the backing storage.
    #[must_use]
    pub fn fetch_total_count(&self) -> u64 {
        self.fetch_total_count.load(Ordering::Relaxed)
    }

    /// Number of backend fetches that found their object.
    #[must_use]
    pub fn fetch_hit_count(&self) -> u64 {
        self.fetch_hit_count.load(Ordering::Relaxed)
    }

    /// Total bytes fetched from backing storage.
    #[must_use]
    pub fn fetch_size(&self) -> u64 {
        self.fetch_size.load(Ordering::Relaxed)
    }
}

struct ReadState {
    /// Reads still to perform, ordered by key.
    pending: BTreeMap<Hash, u32>,
    /// Key of the last dispatched read.
    last: Hash,
    /// Bumped every time the drain wraps to the start of the key space.
    generation: u64,
    shutdown: bool,
}

/// Pending asynchronous reads for one store.
///
/// Reads are drained in key order starting from the last dispatched key,
/// wrapping around when the tail is exhausted; each wrap completes a
/// generation, which is what [`ReadQueue::wait_all`] waits on.
pub struct ReadQueue {
    state: Mutex<ReadState>,
    work_cv: Condvar,
    gen_cv: Condvar,
}

impl ReadQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReadState {
                pending: BTreeMap::new(),
                last: Hash::ZERO,
                generation: 0,
                shutdown: false,
            }),
            work_cv: Condvar::new(),
            gen_cv: Condvar::new(),
        })
    }

    /// Posts a read. Returns false if it was already pending or the queue
    /// is shut down.
    pub fn post(&self, hash: Hash, seq: u32) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        if state.pending.insert(hash, seq).is_none() {
            self.work_cv.notify_one();
            true
        } else {
            false
        }
    }

    /// Blocks until a read is available; `None` means shutdown.
    pub(crate) fn next(&self) -> Option<(Hash, u32)> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if state.pending.is_empty() {
                // All work is done.
                self.gen_cv.notify_all();
                self.work_cv.wait(&mut state);
                continue;
            }
            let last = state.last;
            let key = match state.pending.range(last..).next() {
                Some((&key, _)) => key,
                None => {
                    // A generation has completed; wrap to the front.
                    state.generation += 1;
                    self.gen_cv.notify_all();
                    match state.pending.keys().next() {
                        Some(&key) => key,
                        None => continue,
                    }
                }
            };
            let seq = match state.pending.remove(&key) {
                Some(seq) => seq,
                None => continue,
            };
            state.last = key;
            return Some((key, seq));
        }
    }

    /// Waits until every read posted before the call has been dispatched.
    pub fn wait_all(&self) {
        let mut state = self.state.lock();
        // Waiting out two generations guarantees reads posted mid-wrap
        // are covered.
        let wake_generation = state.generation + 2;
        while !state.shutdown && !state.pending.is_empty() && state.generation < wake_generation {
            self.gen_cv.wait(&mut state);
        }
    }

    /// Stops the queue; read threads drain out with `None`.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            self.work_cv.notify_all();
            self.gen_cv.notify_all();
        }
    }

    /// Number of reads still pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Outcome of a non-blocking fetch.
pub enum AsyncFetch {
    /// Answered from cache; `None` means known absent.
    Completed(Option<Arc<NodeObject>>),
    /// A read was posted; the object will land in the cache.
    Pending,
}

/// A store façade for content-addressed node objects.
///
/// The required methods cover routing and storage; the provided methods
/// implement the shared fetch pipeline on top of them.
pub trait NodeDb: NodeSource + Send + Sync {
    /// Diagnostic name of the store.
    fn name(&self) -> &str;

    /// This store's counters.
    fn stats(&self) -> &StoreStats;

    /// This store's async read queue.
    fn read_queue(&self) -> &Arc<ReadQueue>;

    /// Returns the cache pair serving `seq`, or `None` if this store does
    /// not serve that sequence.
    fn caches(&self, seq: u32) -> Option<CachePair>;

    /// Reads straight from backing storage, bypassing the caches.
    fn fetch_from(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>>;

    /// Stores one object for the ledger at `seq`.
    ///
    /// Sequence-routed stores silently drop objects for sequences they
    /// are not currently writing, with a warning.
    fn store(&self, node_type: NodeType, data: Vec<u8>, hash: Hash, seq: u32);

    /// Copies a ledger stored in a different database into this one.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] naming the first problem; the store keeps
    /// its prior state for that ledger.
    fn copy_ledger(&self, ledger: &Arc<Ledger>) -> Result<(), StoreError>;

    /// Estimated pending write pressure.
    fn write_load(&self) -> u64;

    /// File descriptors this store needs the process limit to cover.
    fn fd_limit(&self) -> u32;

    /// Fetches an object, consulting caches first.
    fn fetch(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>> {
        do_fetch(self, hash, seq, false)
    }

    /// Fetches without blocking on storage.
    ///
    /// On a cache miss the read is posted to the read pool and
    /// [`AsyncFetch::Pending`] is returned.
    fn async_fetch(&self, hash: &Hash, seq: u32) -> AsyncFetch {
        let Some(caches) = self.caches(seq) else {
            return AsyncFetch::Completed(None);
        };
        if let Some(object) = caches.positive.fetch(hash) {
            return AsyncFetch::Completed(Some(object));
        }
        if caches.negative.touch_if_exists(hash) {
            return AsyncFetch::Completed(None);
        }
        self.read_queue().post(*hash, seq);
        AsyncFetch::Pending
    }

    /// Waits for all currently pending async reads to complete.
    fn wait_reads(&self) {
        self.read_queue().wait_all();
    }

    /// How many async reads the store prefers to have outstanding.
    ///
    /// Kept below the cache size so prefetches are not pushed out before
    /// they are consumed.
    fn desired_async_read_count(&self, seq: u32) -> usize {
        let target = self
            .caches(seq)
            .map_or(CACHE_TARGET_SIZE, |caches| caches.positive.target_size());
        target / ASYNC_DIVIDER
    }
}

/// The shared fetch pipeline.
pub(crate) fn do_fetch<S: NodeDb + ?Sized>(
    store: &S,
    hash: &Hash,
    seq: u32,
    is_async: bool,
) -> Option<Arc<NodeObject>> {
    let caches = store.caches(seq)?;
    if let Some(object) = caches.positive.fetch(hash) {
        return Some(object);
    }
    if caches.negative.touch_if_exists(hash) {
        return None;
    }

    store.stats().note_fetch();
    match store.fetch_from(hash, seq) {
        Some(object) => {
            // Ensure all threads get the same instance.
            let object = caches.positive.canonicalize(*hash, object);
            trace!(store = store.name(), hash = %hash, is_async, "fetched from storage");
            Some(object)
        }
        None => {
            // A write may have raced us into the cache.
            if let Some(object) = caches.positive.fetch(hash) {
                Some(object)
            } else {
                caches.negative.insert(*hash);
                None
            }
        }
    }
}

/// Fetches from one backend, mapping status to an option.
pub(crate) fn fetch_internal(
    stats: &StoreStats,
    backend: &dyn Backend,
    hash: &Hash,
) -> Option<Arc<NodeObject>> {
    match backend.fetch(hash) {
        Ok(Some(object)) => {
            stats.note_fetch_hit(object.data().len());
            Some(object)
        }
        Ok(None) => None,
        Err(BackendError::Corrupt(hash)) => {
            error!(backend = backend.name(), hash = %hash, "corrupt node object");
            None
        }
        Err(err) => {
            warn!(backend = backend.name(), hash = %hash, %err, "backend fetch failed");
            None
        }
    }
}

/// Stores one object through the cache pair into a backend.
pub(crate) fn store_internal(
    stats: &StoreStats,
    caches: &CachePair,
    backend: &dyn Backend,
    object: Arc<NodeObject>,
) -> Result<Arc<NodeObject>, BackendError> {
    let object = caches.positive.canonicalize(*object.hash(), object);
    backend.store(&object)?;
    stats.note_store(object.data().len());
    caches.negative.erase(object.hash());
    Ok(object)
}

/// Stores a batch through the cache pair into a backend.
pub(crate) fn store_batch_internal(
    stats: &StoreStats,
    caches: &CachePair,
    backend: &dyn Backend,
    batch: Vec<Arc<NodeObject>>,
) -> Result<(), BackendError> {
    let mut canonical = Vec::with_capacity(batch.len());
    for object in batch {
        let object = caches.positive.canonicalize(*object.hash(), object);
        stats.note_store(object.data().len());
        caches.negative.erase(object.hash());
        canonical.push(object);
    }
    backend.store_batch(&canonical)
}

/// Copies every object of `source` into `dest`, batched.
pub(crate) fn import_internal(
    stats: &StoreStats,
    source: &dyn Backend,
    dest: &dyn Backend,
) -> Result<(), BackendError> {
    let mut batch: Vec<Arc<NodeObject>> = Vec::with_capacity(BATCH_WRITE_LIMIT);
    let mut failure: Option<BackendError> = None;
    source.for_each(&mut |object| {
        if failure.is_some() {
            return;
        }
        stats.note_store(object.data().len());
        batch.push(object);
        if batch.len() >= BATCH_WRITE_LIMIT {
            if let Err(err) = dest.store_batch(&batch) {
                failure = Some(err);
            }
            batch.clear();
        }
    })?;
    if let Some(err) = failure {
        return Err(err);
    }
    if !batch.is_empty() {
        dest.store_batch(&batch)?;
    }
    Ok(())
}

/// Spawns the read worker pool for a store.
///
/// Workers hold only a weak reference; they exit when the store is
/// dropped or its queue is shut down.
pub(crate) fn spawn_read_threads<S>(
    store: &Arc<S>,
    count: usize,
) -> io::Result<Vec<JoinHandle<()>>>
where
    S: NodeDb + 'static,
{
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let queue = Arc::clone(store.read_queue());
        let weak: Weak<S> = Arc::downgrade(store);
        let handle = std::thread::Builder::new()
            .name(format!("prefetch-{i}"))
            .spawn(move || {
                while let Some((hash, seq)) = queue.next() {
                    match weak.upgrade() {
                        Some(store) => {
                            let _ = do_fetch(&*store, &hash, seq, true);
                        }
                        None => break,
                    }
                }
            })?;
        handles.push(handle);
    }
    Ok(handles)
}
