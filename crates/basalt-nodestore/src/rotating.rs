//! The rotating store: a two-generation hot/cold backend pair.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use basalt_ids::Hash;
use basalt_ledger::{Batch, Ledger, NodeObject, NodeSource, NodeType, SourceId};
use parking_lot::Mutex;
use tracing::warn;

use crate::backend::Backend;
use crate::cache::CachePair;
use crate::database::{
    do_fetch, fetch_internal, import_internal, spawn_read_threads, store_batch_internal,
    store_internal, NodeDb, ReadQueue, StoreStats,
};
use crate::error::StoreError;

struct RotatingBackends {
    writable: Arc<dyn Backend>,
    archive: Arc<dyn Backend>,
}

/// A store over two backends: a hot writable generation and a cold
/// archive generation.
///
/// Reads check the writable backend first and fall back to the archive;
/// an archive hit is promoted by rewriting the object into the writable
/// backend, concentrating the working set in the hot generation. Rotation
/// retires the archive, demotes the writable backend in its place, and
/// installs a fresh writable one. The pair amounts to a primitive
/// two-generation online compaction: data survives exactly one rotation
/// after its last write or promotion.
pub struct RotatingStore {
    name: String,
    source_id: SourceId,
    stats: StoreStats,
    queue: Arc<ReadQueue>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    caches: CachePair,
    backends: Mutex<RotatingBackends>,
}

impl RotatingStore {
    /// Creates a rotating store over the given backend pair and spawns
    /// its read pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the read threads cannot be spawned.
    pub fn new(
        name: &str,
        writable: Arc<dyn Backend>,
        archive: Arc<dyn Backend>,
        cache_size: usize,
        cache_age: Duration,
        read_threads: usize,
    ) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new(Self {
            name: name.to_string(),
            source_id: basalt_ledger::next_source_id(),
            stats: StoreStats::default(),
            queue: ReadQueue::new(),
            threads: Mutex::new(Vec::new()),
            caches: CachePair::new(name, cache_size, cache_age),
            backends: Mutex::new(RotatingBackends { writable, archive }),
        });
        let handles = spawn_read_threads(&store, read_threads)?;
        *store.threads.lock() = handles;
        Ok(store)
    }

    /// Atomically rotates the generations: the archive retires, the
    /// writable backend becomes the archive, and `new_writable` takes
    /// over. Returns the retired backend so the caller can delete or
    /// rename its storage.
    ///
    /// In-flight reads holding the retired backend stay valid for their
    /// duration; shared ownership keeps it alive until they finish.
    pub fn rotate(&self, new_writable: Arc<dyn Backend>) -> Arc<dyn Backend> {
        let mut backends = self.backends.lock();
        let new_archive = backends.writable.clone();
        let retired = std::mem::replace(&mut backends.archive, new_archive);
        backends.writable = new_writable;
        retired
    }

    /// Bulk-imports every object of `source` into the writable backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if iteration or a write fails.
    pub fn import(&self, source: &dyn Backend) -> Result<(), StoreError> {
        let writable = self.backends.lock().writable.clone();
        import_internal(&self.stats, source, &*writable)?;
        Ok(())
    }

    /// Applies new cache bounds.
    pub fn tune(&self, cache_size: usize, cache_age: Duration) {
        self.caches.tune(cache_size, cache_age);
    }

    /// Evicts stale and over-budget cache entries.
    pub fn sweep(&self) {
        self.caches.sweep();
    }

    /// Positive cache hits as a fraction of all lookups.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        self.caches.positive.hit_rate()
    }

    /// Stops the read pool. Called automatically on drop.
    pub fn close(&self) {
        self.queue.shutdown();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn writable(&self) -> Arc<dyn Backend> {
        self.backends.lock().writable.clone()
    }
}

impl Drop for RotatingStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl NodeSource for RotatingStore {
    fn source_id(&self) -> SourceId {
        self.source_id
    }

    fn node(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>> {
        do_fetch(self, hash, seq, false)
    }
}

impl NodeDb for RotatingStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn read_queue(&self) -> &Arc<ReadQueue> {
        &self.queue
    }

    fn caches(&self, _seq: u32) -> Option<CachePair> {
        Some(self.caches.clone())
    }

    fn fetch_from(&self, hash: &Hash, _seq: u32) -> Option<Arc<NodeObject>> {
        let (writable, archive) = {
            let backends = self.backends.lock();
            (backends.writable.clone(), backends.archive.clone())
        };
        if let Some(object) = fetch_internal(&self.stats, &*writable, hash) {
            return Some(object);
        }
        let object = fetch_internal(&self.stats, &*archive, hash)?;
        // Promote: rewrite the archive hit into the hot generation. The
        // writable backend is re-read in case a rotation raced the fetch.
        if let Err(err) = self.writable().store(&object) {
            warn!(store = %self.name, hash = %hash, %err, "promotion failed");
        }
        self.caches.negative.erase(hash);
        Some(object)
    }

    fn store(&self, node_type: NodeType, data: Vec<u8>, hash: Hash, _seq: u32) {
        let object = NodeObject::with_hash(node_type, hash, data);
        let writable = self.writable();
        if let Err(err) = store_internal(&self.stats, &self.caches, &*writable, object) {
            warn!(store = %self.name, hash = %hash, %err, "store failed");
        }
    }

    fn copy_ledger(&self, ledger: &Arc<Ledger>) -> Result<(), StoreError> {
        let seq = ledger.seq();
        if ledger.hash().is_zero() || ledger.account_hash().is_zero() {
            return Err(StoreError::InvalidLedger(seq));
        }
        if ledger.source().source_id() == self.source_id {
            return Err(StoreError::SameSource);
        }

        let mut batch: Batch = vec![NodeObject::with_hash(
            NodeType::Ledger,
            ledger.hash(),
            ledger.header().to_prefixed_bytes(),
        )];
        ledger
            .state_trie()
            .visit_nodes(&mut |object| {
                batch.push(object.clone());
                true
            })
            .map_err(|err| StoreError::from_trie(seq, err))?;
        if !ledger.tx_hash().is_zero() {
            ledger
                .tx_trie()
                .visit_nodes(&mut |object| {
                    batch.push(object.clone());
                    true
                })
                .map_err(|err| StoreError::from_trie(seq, err))?;
        }

        let writable = self.writable();
        store_batch_internal(&self.stats, &self.caches, &*writable, batch)?;
        Ok(())
    }

    fn write_load(&self) -> u64 {
        let backends = self.backends.lock();
        backends.writable.write_load() + backends.archive.write_load()
    }

    fn fd_limit(&self) -> u32 {
        let backends = self.backends.lock();
        backends.writable.fd_limit() + backends.archive.fd_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemBackend;
    use crate::database::AsyncFetch;

    fn store() -> Arc<RotatingStore> {
        RotatingStore::new(
            "rotating-test",
            MemBackend::new(),
            MemBackend::new(),
            256,
            Duration::from_secs(60),
            2,
        )
        .unwrap()
    }

    fn put(store: &RotatingStore, data: &[u8]) -> Hash {
        let hash = Hash::digest(data);
        store.store(NodeType::Leaf, data.to_vec(), hash, 1);
        hash
    }

    fn flush_caches(store: &RotatingStore) {
        store.tune(0, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        store.sweep();
    }

    #[test]
    fn test_store_then_fetch() {
        let store = store();
        let hash = put(&store, b"object one");
        let fetched = store.fetch(&hash, 1).unwrap();
        assert_eq!(fetched.data(), b"object one");
    }

    #[test]
    fn test_archive_hit_promotes_to_writable() {
        let store = store();
        let hash = put(&store, b"promote me");

        // Move the object into the archive generation.
        store.rotate(MemBackend::new());
        flush_caches(&store);

        let writable = store.writable();
        assert!(writable.fetch(&hash).unwrap().is_none());

        assert!(store.fetch(&hash, 1).is_some());
        // Promotion rewrote it into the hot backend.
        assert!(writable.fetch(&hash).unwrap().is_some());
    }

    #[test]
    fn test_double_rotation_expels() {
        let store = store();
        let hash = put(&store, b"short lived");

        store.rotate(MemBackend::new());
        store.rotate(MemBackend::new());
        flush_caches(&store);

        assert!(store.fetch(&hash, 1).is_none());
        // The miss landed in the negative cache.
        assert!(store.caches.negative.touch_if_exists(&hash));
    }

    #[test]
    fn test_rotate_returns_retired_archive() {
        let writable = MemBackend::new();
        let archive = MemBackend::new();
        let object = NodeObject::compute(NodeType::Leaf, vec![1]);
        archive.store(&object).unwrap();

        let store = RotatingStore::new(
            "rotating-test",
            writable,
            archive.clone(),
            256,
            Duration::from_secs(60),
            0,
        )
        .unwrap();

        let retired = store.rotate(MemBackend::new());
        assert!(retired.fetch(object.hash()).unwrap().is_some());
        let archive: Arc<dyn Backend> = archive;
        assert!(Arc::ptr_eq(&retired, &archive));
    }

    #[test]
    fn test_copy_ledger_rejects_self_source() {
        let store = store();
        let header = basalt_ledger::LedgerHeader {
            seq: 5,
            total_coins: 0,
            close_time: 0,
            parent_hash: Hash::ZERO,
            account_hash: Hash::digest(b"root"),
            tx_hash: Hash::ZERO,
        };
        let source: Arc<dyn NodeSource> = store.clone();
        let ledger = Ledger::new(header, source);
        assert!(matches!(
            store.copy_ledger(&ledger),
            Err(StoreError::SameSource)
        ));
    }

    #[test]
    fn test_async_fetch_completes_from_cache() {
        let store = store();
        let hash = put(&store, b"cached");
        match store.async_fetch(&hash, 1) {
            AsyncFetch::Completed(Some(object)) => assert_eq!(object.data(), b"cached"),
            _ => panic!("expected a cache hit"),
        }

        // A miss posts a read and resolves through the pool.
        let absent = Hash::digest(b"not stored");
        assert!(matches!(
            store.async_fetch(&absent, 1),
            AsyncFetch::Pending
        ));
        store.wait_reads();
    }

    #[test]
    fn test_import_copies_backend() {
        let store = store();
        let source = MemBackend::new();
        for i in 0u8..10 {
            source
                .store(&NodeObject::compute(NodeType::Tx, vec![i]))
                .unwrap();
        }
        store.import(&*source).unwrap();
        for i in 0u8..10 {
            let hash = Hash::digest(&[i]);
            assert!(store.fetch(&hash, 1).is_some());
        }
    }
}
