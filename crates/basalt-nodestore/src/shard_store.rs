//! The sharded store: an inventory of fixed-width ledger range shards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use basalt_ids::Hash;
use basalt_ledger::{
    Ledger, LedgerHashResolver, LedgerHeader, NodeObject, NodeSource, NodeType, SourceId,
};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::cache::CachePair;
use crate::config::StoreConfig;
use crate::database::{
    do_fetch, fetch_internal, spawn_read_threads, store_internal, NodeDb, ReadQueue, StoreStats,
    MIN_SHARD_CACHE_SIZE,
};
use crate::error::{BackendError, StoreError};
use crate::interval_set::SeqRangeSet;
use crate::manager::{BackendOptions, Manager};
use crate::shard::{Shard, ShardConfig, ValidateOutcome};

/// Shards the sparse-sampling admission draws before giving up; with a
/// half-occupied space the chance of that many collisions is under 2^-40.
const SPARSE_SAMPLE_ATTEMPTS: usize = 40;

/// Index-space size below which admission enumerates instead of sampling.
const DENSE_INDEX_LIMIT: u32 = 1024;

struct ShardStoreState {
    complete: BTreeMap<u32, Shard>,
    incomplete: Option<Shard>,
    can_add: bool,
    status: String,
    used_disk_space: u64,
    avg_shard_size: u64,
    files_per_shard: u32,
    fd_limit: u32,
    cache_size: usize,
    cache_age: Duration,
}

/// A collection of historical ledger shards behind one read/write
/// surface.
///
/// Each shard owns one backend and one contiguous ledger range. At most
/// one shard is incomplete at a time: the acquisition slot. Reads are
/// routed by sequence to the owning shard; writes are accepted only for
/// the sequence range currently being acquired.
pub struct ShardStore {
    name: String,
    source_id: SourceId,
    manager: Arc<Manager>,
    options: BackendOptions,
    cfg: ShardConfig,
    dir: PathBuf,
    max_disk_space: u64,
    backed: bool,
    stats: StoreStats,
    queue: Arc<ReadQueue>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    state: Mutex<ShardStoreState>,
}

impl ShardStore {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MultipleIncomplete`] if the directory scan
    /// finds more than one incomplete shard, plus any configuration,
    /// backend, or shard recovery failure.
    pub fn open(
        config: &StoreConfig,
        manager: Arc<Manager>,
        read_threads: usize,
    ) -> Result<Arc<Self>, StoreError> {
        let cfg = config.shard_config()?;
        Self::open_with(config, cfg, manager, read_threads)
    }

    /// Opens the store with an explicit shard layout.
    ///
    /// # Errors
    ///
    /// See [`ShardStore::open`].
    pub fn open_with(
        config: &StoreConfig,
        cfg: ShardConfig,
        manager: Arc<Manager>,
        read_threads: usize,
    ) -> Result<Arc<Self>, StoreError> {
        config.validate()?;
        let dir = config.path.clone();
        std::fs::create_dir_all(&dir)?;
        let options = config.backend_options();

        let files_per_shard = probe_backend(&manager, &options, &dir)?;
        let backed = files_per_shard != 0;

        let store = Self {
            name: "shardstore".to_string(),
            source_id: basalt_ledger::next_source_id(),
            manager,
            options,
            cfg,
            dir,
            max_disk_space: config.max_disk_bytes(),
            backed,
            stats: StoreStats::default(),
            queue: ReadQueue::new(),
            threads: Mutex::new(Vec::new()),
            state: Mutex::new(ShardStoreState {
                complete: BTreeMap::new(),
                incomplete: None,
                can_add: true,
                status: String::new(),
                used_disk_space: 0,
                avg_shard_size: cfg.avg_shard_size(),
                files_per_shard,
                fd_limit: 1,
                cache_size: config.cache_size,
                cache_age: config.cache_age(),
            }),
        };

        if backed {
            let mut state = store.state.lock();
            store.scan_shards(&mut state)?;
            if state.complete.is_empty() && state.incomplete.is_none() {
                // Fresh store: estimate the descriptor requirement from
                // the disk budget alone.
                if let Ok(free) = available_disk_space(&store.dir) {
                    if store.max_disk_space > free {
                        warn!(store = %store.name, "insufficient disk space");
                    }
                }
                let shards = (store.max_disk_space / state.avg_shard_size.max(1)).max(1);
                state.fd_limit = saturate_u32(1 + u64::from(files_per_shard) * shards);
            } else {
                store.update_stats(&mut state);
            }
        }

        let store = Arc::new(store);
        let handles = spawn_read_threads(&store, read_threads)?;
        *store.threads.lock() = handles;
        Ok(store)
    }

    fn scan_shards(&self, state: &mut ShardStoreState) -> Result<(), StoreError> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(index) = name.parse::<u32>() else { continue };
            if index < self.cfg.genesis_shard_index() {
                continue;
            }
            let shard = Shard::open(
                self.cfg,
                index,
                state.cache_size,
                state.cache_age,
                &self.manager,
                &self.options,
                &self.dir,
            )?;
            state.used_disk_space += shard.file_size();
            if shard.is_complete() {
                state.complete.insert(index, shard);
            } else if let Some(existing) = &state.incomplete {
                error!(
                    first = existing.index(),
                    second = index,
                    "more than one incomplete shard found"
                );
                return Err(StoreError::MultipleIncomplete(existing.index(), index));
            } else {
                state.incomplete = Some(shard);
            }
        }
        Ok(())
    }

    /// Returns the shard layout this store uses.
    #[must_use]
    pub fn shard_config(&self) -> ShardConfig {
        self.cfg
    }

    /// Returns the next ledger sequence worth acquiring, opening a new
    /// shard for acquisition if none is in flight and the disk budget
    /// allows one.
    ///
    /// `valid_seq` is the highest validated ledger sequence; the shard
    /// currently at the network tip is never acquirable.
    pub fn prepare(&self, valid_seq: u32) -> Option<u32> {
        let mut state = self.state.lock();
        if let Some(shard) = &state.incomplete {
            return shard.prepare();
        }
        if !state.can_add {
            return None;
        }
        if self.backed {
            if state.used_disk_space + state.avg_shard_size > self.max_disk_space {
                debug!(store = %self.name, "maximum size reached");
                state.can_add = false;
                return None;
            }
            if let Ok(free) = available_disk_space(&self.dir) {
                if state.avg_shard_size > free {
                    warn!(store = %self.name, "insufficient disk space");
                    state.can_add = false;
                    return None;
                }
            }
        }

        let Some(index) = self.find_shard_index_to_add(&state, valid_seq) else {
            debug!(store = %self.name, "no new shards to add");
            state.can_add = false;
            return None;
        };
        let cache_size = MIN_SHARD_CACHE_SIZE.max(state.cache_size / (state.complete.len() + 1));
        match Shard::open(
            self.cfg,
            index,
            cache_size,
            state.cache_age,
            &self.manager,
            &self.options,
            &self.dir,
        ) {
            Ok(shard) => {
                let seq = shard.prepare();
                state.incomplete = Some(shard);
                seq
            }
            Err(err) => {
                warn!(index, %err, "failed to open shard for acquisition");
                let _ = std::fs::remove_dir_all(self.dir.join(index.to_string()));
                None
            }
        }
    }

    /// Picks an unowned shard index at random in `[genesis, max]`.
    ///
    /// Small or mostly-owned index spaces are enumerated and sampled
    /// uniformly; large sparse spaces are probed with independent draws.
    fn find_shard_index_to_add(&self, state: &ShardStoreState, valid_seq: u32) -> Option<u32> {
        let genesis = self.cfg.genesis_shard_index();
        if valid_seq < self.cfg.genesis_seq() {
            return None;
        }
        let mut max_index = self.cfg.shard_index(valid_seq);
        if valid_seq != self.cfg.last_seq(max_index) {
            // The tip shard is still growing; it cannot be acquired.
            if max_index == 0 {
                return None;
            }
            max_index -= 1;
        }
        if max_index < genesis {
            return None;
        }

        let owned = |index: u32| {
            state.complete.contains_key(&index)
                || state
                    .incomplete
                    .as_ref()
                    .is_some_and(|shard| shard.index() == index)
        };
        let num_shards = state.complete.len() as u64 + u64::from(state.incomplete.is_some());
        let span = u64::from(max_index - genesis) + 1;
        if num_shards >= span {
            return None;
        }

        let mut rng = rand::thread_rng();
        if max_index < DENSE_INDEX_LIMIT || num_shards as f64 / f64::from(max_index) > 0.5 {
            let available: Vec<u32> = (genesis..=max_index).filter(|i| !owned(*i)).collect();
            if !available.is_empty() {
                return Some(available[rng.gen_range(0..available.len())]);
            }
        }
        for _ in 0..SPARSE_SAMPLE_ATTEMPTS {
            let candidate = rng.gen_range(genesis..=max_index);
            if !owned(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Marks a ledger whose nodes were stored through [`NodeDb::store`]
    /// as fully acquired. Returns true if it was newly recorded.
    ///
    /// A ledger outside the incomplete shard's range is dropped with a
    /// warning; the acquirer has moved on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLedger`] for a zero hash or state
    /// root, or a [`StoreError::Shard`] if the control file cannot be
    /// persisted.
    pub fn set_stored(&self, ledger: &Arc<Ledger>) -> Result<bool, StoreError> {
        if ledger.hash().is_zero() || ledger.account_hash().is_zero() {
            error!(seq = ledger.seq(), "invalid ledger");
            return Err(StoreError::InvalidLedger(ledger.seq()));
        }
        let index = self.cfg.shard_index(ledger.seq());
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state
            .incomplete
            .as_ref()
            .is_some_and(|shard| shard.index() == index)
        {
            warn!(seq = ledger.seq(), "ledger is not being acquired");
            return Ok(false);
        }
        self.finish_stored(state, ledger)
    }

    /// Returns true if the ledger at `seq` is stored.
    #[must_use]
    pub fn has_ledger(&self, seq: u32) -> bool {
        if seq < self.cfg.genesis_seq() {
            return false;
        }
        let index = self.cfg.shard_index(seq);
        let state = self.state.lock();
        if state.complete.contains_key(&index) {
            return true;
        }
        state
            .incomplete
            .as_ref()
            .is_some_and(|shard| shard.index() == index && shard.has_ledger(seq))
    }

    /// Reconstructs a full ledger from the store.
    ///
    /// Verifies header consistency and the presence of both trie roots;
    /// corrupt or partial data yields `None` with an error log.
    #[must_use]
    pub fn fetch_ledger(self: &Arc<Self>, hash: &Hash, seq: u32) -> Option<Arc<Ledger>> {
        if !self.has_ledger(seq) {
            return None;
        }
        let object = self.fetch(hash, seq)?;
        let header = match LedgerHeader::from_prefixed_bytes(object.data()) {
            Ok(header) => header,
            Err(err) => {
                error!(seq, %hash, %err, "stored ledger header is malformed");
                return None;
            }
        };
        if header.hash() != *hash || header.seq != seq {
            error!(
                shard = self.cfg.shard_index(seq),
                seq,
                %hash,
                "ledger has corrupt data"
            );
            return None;
        }
        if self.fetch(&header.account_hash, seq).is_none() {
            error!(seq, %hash, "missing account state root");
            return None;
        }
        if !header.tx_hash.is_zero() && self.fetch(&header.tx_hash, seq).is_none() {
            error!(seq, %hash, "missing transaction root");
            return None;
        }
        let source: Arc<dyn NodeSource> = self.clone();
        Some(Ledger::new(header, source))
    }

    /// Returns the comma-separated ranges of complete shard indexes,
    /// e.g. `"0-3,5,7-9"`.
    #[must_use]
    pub fn complete_shards(&self) -> String {
        self.state.lock().status.clone()
    }

    /// Returns true if the store may still open new acquisition shards.
    #[must_use]
    pub fn can_add(&self) -> bool {
        self.state.lock().can_add
    }

    /// Returns the disk space currently used by all shards.
    #[must_use]
    pub fn used_disk_space(&self) -> u64 {
        self.state.lock().used_disk_space
    }

    /// Sets the aggregate cache target; each shard receives a
    /// proportional slice with a fixed floor.
    pub fn tune(&self, cache_size: usize, cache_age: Duration) {
        let mut state = self.state.lock();
        state.cache_size = cache_size;
        state.cache_age = cache_age;
        let per_shard = MIN_SHARD_CACHE_SIZE.max(cache_size / (state.complete.len() + 1));
        for shard in state.complete.values() {
            shard.caches().tune(per_shard, cache_age);
        }
        if let Some(shard) = &state.incomplete {
            shard.caches().tune(per_shard, cache_age);
        }
    }

    /// Evicts stale entries and shrinks oversized shard caches.
    pub fn sweep(&self) {
        let state = self.state.lock();
        let per_shard = MIN_SHARD_CACHE_SIZE.max(state.cache_size / (state.complete.len() + 1));
        let shards = state
            .complete
            .values()
            .chain(state.incomplete.as_ref());
        for shard in shards {
            let caches = shard.caches();
            caches.sweep();
            if caches.positive.target_size() > per_shard {
                caches.positive.set_target_size(per_shard);
            }
        }
    }

    /// Mean positive-cache hit rate across all shards.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let state = self.state.lock();
        let mut total = 0.0;
        let mut count = 0usize;
        for shard in state.complete.values().chain(state.incomplete.as_ref()) {
            total += shard.p_cache().hit_rate();
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// Structurally validates every shard, newest ledger first within
    /// each.
    pub fn validate(&self, resolver: &dyn LedgerHashResolver) -> Vec<(u32, ValidateOutcome)> {
        let state = self.state.lock();
        state
            .complete
            .values()
            .chain(state.incomplete.as_ref())
            .map(|shard| (shard.index(), shard.validate(resolver)))
            .collect()
    }

    /// Stops the read pool. Called automatically on drop.
    pub fn close(&self) {
        self.queue.shutdown();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn finish_stored(
        &self,
        state: &mut ShardStoreState,
        ledger: &Arc<Ledger>,
    ) -> Result<bool, StoreError> {
        let Some(shard) = state.incomplete.as_mut() else {
            return Err(StoreError::NotAcquiring(ledger.seq()));
        };
        let before = shard.file_size();
        let newly = shard.set_stored(ledger)?;
        let after = shard.file_size();
        let completed = shard.is_complete();

        let used = i128::from(state.used_disk_space) + i128::from(after) - i128::from(before);
        state.used_disk_space = u64::try_from(used.max(0)).unwrap_or(u64::MAX);

        if newly && completed {
            if let Some(shard) = state.incomplete.take() {
                state.complete.insert(shard.index(), shard);
            }
            self.update_stats(state);
        }
        Ok(newly)
    }

    /// Recomputes derived statistics. Lock must be held.
    fn update_stats(&self, state: &mut ShardStoreState) {
        let mut files_per_shard = state.files_per_shard;
        if state.complete.is_empty() {
            state.status.clear();
            if let Some(shard) = &state.incomplete {
                files_per_shard = shard.fd_limit();
            }
        } else {
            let mut indexes = SeqRangeSet::new();
            let mut total_size = 0u64;
            for (index, shard) in &state.complete {
                indexes.insert(*index);
                total_size += shard.file_size();
                files_per_shard = shard.fd_limit();
            }
            state.status = indexes.to_string();
            if self.backed {
                state.avg_shard_size = (total_size / state.complete.len() as u64).max(1);
            }
        }
        if !self.backed {
            return;
        }

        let shard_count = state.complete.len() as u64 + u64::from(state.incomplete.is_some());
        let mut fd_limit = 1 + u64::from(files_per_shard) * shard_count;
        if state.used_disk_space >= self.max_disk_space {
            warn!(store = %self.name, "maximum size reached");
            state.can_add = false;
        } else {
            let remaining = self.max_disk_space - state.used_disk_space;
            if let Ok(free) = available_disk_space(&self.dir) {
                if remaining > free {
                    warn!(
                        store = %self.name,
                        "disk budget exceeds remaining free space"
                    );
                }
            }
            fd_limit += u64::from(files_per_shard) * (remaining / state.avg_shard_size.max(1));
        }
        state.fd_limit = saturate_u32(fd_limit);
    }

    /// Snapshots the caches serving `seq` under the lock.
    fn route_caches(&self, seq: u32) -> Option<CachePair> {
        if seq < self.cfg.genesis_seq() {
            return None;
        }
        let index = self.cfg.shard_index(seq);
        let state = self.state.lock();
        if let Some(shard) = state.complete.get(&index) {
            return Some(shard.caches());
        }
        state
            .incomplete
            .as_ref()
            .filter(|shard| shard.index() == index)
            .map(Shard::caches)
    }

    /// Snapshots the backend serving `seq` under the lock.
    fn route_backend(&self, seq: u32) -> Option<Arc<dyn Backend>> {
        if seq < self.cfg.genesis_seq() {
            return None;
        }
        let index = self.cfg.shard_index(seq);
        let state = self.state.lock();
        if let Some(shard) = state.complete.get(&index) {
            return Some(shard.backend().clone());
        }
        state
            .incomplete
            .as_ref()
            .filter(|shard| shard.index() == index)
            .map(|shard| shard.backend().clone())
    }
}

impl Drop for ShardStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl NodeSource for ShardStore {
    fn source_id(&self) -> SourceId {
        self.source_id
    }

    fn node(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>> {
        do_fetch(self, hash, seq, false)
    }
}

impl NodeDb for ShardStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn read_queue(&self) -> &Arc<ReadQueue> {
        &self.queue
    }

    fn caches(&self, seq: u32) -> Option<CachePair> {
        self.route_caches(seq)
    }

    fn fetch_from(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>> {
        let backend = self.route_backend(seq)?;
        fetch_internal(&self.stats, &*backend, hash)
    }

    fn store(&self, node_type: NodeType, data: Vec<u8>, hash: Hash, seq: u32) {
        let index = if seq >= self.cfg.genesis_seq() {
            self.cfg.shard_index(seq)
        } else {
            u32::MAX
        };
        let state = self.state.lock();
        let Some(shard) = state
            .incomplete
            .as_ref()
            .filter(|shard| shard.index() == index)
        else {
            warn!(seq, "ledger is not being acquired");
            return;
        };
        let object = NodeObject::with_hash(node_type, hash, data);
        if let Err(err) = store_internal(&self.stats, &shard.caches(), &**shard.backend(), object)
        {
            warn!(seq, %hash, %err, "shard store failed");
        }
    }

    fn copy_ledger(&self, ledger: &Arc<Ledger>) -> Result<(), StoreError> {
        let seq = ledger.seq();
        if ledger.hash().is_zero() || ledger.account_hash().is_zero() {
            error!(seq, "source ledger is invalid");
            return Err(StoreError::InvalidLedger(seq));
        }
        if ledger.source().source_id() == self.source_id {
            error!("same source and destination stores");
            return Err(StoreError::SameSource);
        }
        let index = if seq >= self.cfg.genesis_seq() {
            self.cfg.shard_index(seq)
        } else {
            u32::MAX
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (caches, backend, next) = {
            let Some(shard) = state
                .incomplete
                .as_ref()
                .filter(|shard| shard.index() == index)
            else {
                warn!(seq, "source ledger is not being acquired");
                return Err(StoreError::NotAcquiring(seq));
            };
            (
                shard.caches(),
                shard.backend().clone(),
                shard.last_stored().cloned(),
            )
        };

        // Store the ledger header.
        store_internal(
            &self.stats,
            &caches,
            &*backend,
            NodeObject::with_hash(
                NodeType::Ledger,
                ledger.hash(),
                ledger.header().to_prefixed_bytes(),
            ),
        )?;

        let mut store_failure: Option<BackendError> = None;

        // State trie: walk only the structural difference when the
        // previously stored successor links to this ledger.
        let state_trie = ledger.state_trie();
        let walked = {
            let mut copy = |object: &Arc<NodeObject>| -> bool {
                match store_internal(&self.stats, &caches, &*backend, object.clone()) {
                    Ok(_) => true,
                    Err(err) => {
                        store_failure = Some(err);
                        false
                    }
                }
            };
            match &next {
                Some(successor) if successor.parent_hash() == ledger.hash() => {
                    state_trie.visit_differences(&successor.state_trie(), &mut copy)
                }
                _ => state_trie.visit_nodes(&mut copy),
            }
        };
        walked.map_err(|err| StoreError::from_trie(seq, err))?;
        if let Some(err) = store_failure.take() {
            return Err(err.into());
        }

        // Transaction trie: always a full walk.
        if !ledger.tx_hash().is_zero() {
            let walked = {
                let mut copy = |object: &Arc<NodeObject>| -> bool {
                    match store_internal(&self.stats, &caches, &*backend, object.clone()) {
                        Ok(_) => true,
                        Err(err) => {
                            store_failure = Some(err);
                            false
                        }
                    }
                };
                ledger.tx_trie().visit_nodes(&mut copy)
            };
            walked.map_err(|err| StoreError::from_trie(seq, err))?;
            if let Some(err) = store_failure {
                return Err(err.into());
            }
        }

        self.finish_stored(state, ledger).map(|_| ())
    }

    fn write_load(&self) -> u64 {
        let state = self.state.lock();
        state
            .complete
            .values()
            .chain(state.incomplete.as_ref())
            .map(|shard| shard.backend().write_load())
            .sum()
    }

    fn fd_limit(&self) -> u32 {
        self.state.lock().fd_limit
    }
}

/// Probes the configured backend type in a throwaway directory and
/// returns its per-instance descriptor footprint (0 for non-persistent
/// backends).
fn probe_backend(
    manager: &Manager,
    options: &BackendOptions,
    dir: &Path,
) -> Result<u32, StoreError> {
    let mut n = 0;
    let tmp = loop {
        let candidate = dir.join(format!("TMP{n}"));
        if !candidate.is_dir() {
            break candidate;
        }
        n += 1;
    };
    std::fs::create_dir_all(&tmp)?;
    let fd_limit = {
        let backend = manager.make_backend(&options.with_path(&tmp))?;
        backend.fd_limit()
    };
    std::fs::remove_dir_all(&tmp)?;
    Ok(fd_limit)
}

fn available_disk_space(path: &Path) -> std::io::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|err| std::io::Error::from_raw_os_error(err as i32))?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::testing::manager_with_filemem;

    #[test]
    fn test_probe_directory_is_removed() {
        let root = tempdir().unwrap();
        let manager = manager_with_filemem();
        let config = StoreConfig::new("filemem", root.path(), 4);
        let cfg = ShardConfig::new(8, 2).unwrap();
        let _store = ShardStore::open_with(&config, cfg, manager, 0).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("TMP"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_probe_skips_existing_tmp_dirs() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("TMP0")).unwrap();

        let manager = manager_with_filemem();
        let config = StoreConfig::new("filemem", root.path(), 4);
        let cfg = ShardConfig::new(8, 2).unwrap();
        let _store = ShardStore::open_with(&config, cfg, manager, 0).unwrap();

        // The pre-existing directory is untouched; the probe used TMP1.
        assert!(root.path().join("TMP0").is_dir());
        assert!(!root.path().join("TMP1").exists());
    }

    #[test]
    fn test_memory_backed_store_is_transient() {
        let root = tempdir().unwrap();
        let manager = Arc::new(Manager::new());
        let config = StoreConfig::new("memory", root.path(), 4);
        let cfg = ShardConfig::new(8, 2).unwrap();
        let store = ShardStore::open_with(&config, cfg, manager, 0).unwrap();

        // Acquisition works, but no control file is ever written.
        assert_eq!(store.prepare(8), Some(8));
        let control = root.path().join("0").join(crate::shard::CONTROL_FILE_NAME);
        assert!(!control.exists());
        // A non-persistent store reports the base descriptor count only.
        assert_eq!(store.fd_limit(), 1);
    }

    #[test]
    fn test_scan_ignores_foreign_directories() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("not-a-shard")).unwrap();
        std::fs::write(root.path().join("stray-file"), b"x").unwrap();

        let manager = manager_with_filemem();
        let config = StoreConfig::new("filemem", root.path(), 4);
        let cfg = ShardConfig::new(8, 2).unwrap();
        let store = ShardStore::open_with(&config, cfg, manager, 0).unwrap();
        assert_eq!(store.complete_shards(), "");
    }
}
