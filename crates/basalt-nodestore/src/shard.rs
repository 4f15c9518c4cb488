//! A shard: one contiguous range of ledger history on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use basalt_ids::Hash;
use basalt_ledger::{
    Ledger, LedgerHashResolver, LedgerHeader, NodeObject, NodeSource, SourceId,
};
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::cache::{CachePair, KeyCache, NodeCache};
use crate::database::{fetch_internal, StoreStats};
use crate::error::{ConfigError, ShardError};
use crate::interval_set::SeqRangeSet;
use crate::manager::{BackendOptions, Manager};

/// Name of the durable acquisition-state manifest inside a shard
/// directory.
pub const CONTROL_FILE_NAME: &str = "control.txt";

/// Shard layout: how ledger sequences map onto shard indexes.
///
/// Shard `i` covers sequences `[i * ledgers_per_shard + 1,
/// (i + 1) * ledgers_per_shard]`. The genesis shard is the one containing
/// the earliest ledger the network retains; its effective range is
/// clamped up to that sequence, so it holds fewer ledgers than the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardConfig {
    ledgers_per_shard: u32,
    genesis_seq: u32,
}

impl ShardConfig {
    /// Production shard width.
    pub const DEFAULT_LEDGERS_PER_SHARD: u32 = 16384;

    /// The earliest ledger sequence the network retains.
    pub const DEFAULT_GENESIS_SEQ: u32 = 32570;

    /// Creates a layout. The width should only be changed for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLedgersPerShard`] if the width is
    /// less than 2.
    pub fn new(ledgers_per_shard: u32, genesis_seq: u32) -> Result<Self, ConfigError> {
        if ledgers_per_shard < 2 {
            return Err(ConfigError::InvalidLedgersPerShard(ledgers_per_shard));
        }
        Ok(Self {
            ledgers_per_shard,
            genesis_seq: genesis_seq.max(1),
        })
    }

    /// Returns the number of ledgers in a full shard.
    #[must_use]
    pub fn ledgers_per_shard(&self) -> u32 {
        self.ledgers_per_shard
    }

    /// Returns the earliest retained ledger sequence.
    #[must_use]
    pub fn genesis_seq(&self) -> u32 {
        self.genesis_seq
    }

    /// Returns the shard index containing `seq`.
    #[must_use]
    pub fn shard_index(&self, seq: u32) -> u32 {
        (seq - 1) / self.ledgers_per_shard
    }

    /// Returns the first sequence of shard `index`, clamped up to the
    /// genesis sequence.
    #[must_use]
    pub fn first_seq(&self, index: u32) -> u32 {
        (index * self.ledgers_per_shard + 1).max(self.genesis_seq)
    }

    /// Returns the last sequence of shard `index`.
    #[must_use]
    pub fn last_seq(&self, index: u32) -> u32 {
        (index + 1) * self.ledgers_per_shard
    }

    /// Returns the index of the genesis shard.
    #[must_use]
    pub fn genesis_shard_index(&self) -> u32 {
        self.shard_index(self.genesis_seq)
    }

    /// Returns how many ledgers shard `index` holds when complete.
    #[must_use]
    pub fn num_ledgers(&self, index: u32) -> u32 {
        self.last_seq(index) - self.first_seq(index) + 1
    }

    /// Average disk space a shard requires, in bytes.
    #[must_use]
    pub fn avg_shard_size(&self) -> u64 {
        u64::from(self.ledgers_per_shard) * 192 * 1024
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            ledgers_per_shard: Self::DEFAULT_LEDGERS_PER_SHARD,
            genesis_seq: Self::DEFAULT_GENESIS_SEQ,
        }
    }
}

/// Result of a shard self-validation walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateOutcome {
    /// Every ledger in the range checked out.
    Valid,
    /// A stored ledger failed verification.
    Invalid { seq: u32, hash: Hash },
    /// The walk hit a ledger that is not stored; acquisition is not done.
    Incomplete { seq: u32, hash: Hash },
}

/// A range of historical ledgers backed by one backend.
///
/// Shards are indexed and store up to `ledgers_per_shard` ledgers. Once a
/// shard has its entire range it is complete and never written again.
/// While acquiring, the sequences already stored are tracked in
/// [`SeqRangeSet`] form and mirrored to a control file in the shard
/// directory, so a restart resumes exactly where the last acknowledged
/// store left off. Backends that keep no files (`fd_limit() == 0`) get no
/// control file and their acquisition state is transient.
pub struct Shard {
    index: u32,
    first_seq: u32,
    last_seq: u32,
    cfg: ShardConfig,
    p_cache: Arc<NodeCache>,
    n_cache: Arc<KeyCache>,
    backend: Arc<dyn Backend>,
    dir: PathBuf,
    control: PathBuf,
    complete: bool,
    stored_seqs: SeqRangeSet,
    last_stored: Option<Arc<Ledger>>,
    file_size: u64,
    reader_id: SourceId,
}

impl Shard {
    /// Opens the shard with index `index` under `root_dir`, creating its
    /// directory and backend as needed.
    ///
    /// A previously used directory is recovered: the control file (if
    /// any) restores the acquisition state, a missing control file with a
    /// non-empty directory means the shard completed, and a control file
    /// covering the whole range is stale and is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::InvalidControl`] when the control file names
    /// sequences outside the shard range, and [`ShardError::Backend`] or
    /// [`ShardError::Io`] on environmental failures.
    pub fn open(
        cfg: ShardConfig,
        index: u32,
        cache_size: usize,
        cache_age: Duration,
        manager: &Manager,
        options: &BackendOptions,
        root_dir: &Path,
    ) -> Result<Self, ShardError> {
        debug_assert!(index >= cfg.genesis_shard_index());
        let dir = root_dir.join(index.to_string());
        let is_new = !dir.is_dir() || dir.read_dir()?.next().is_none();
        std::fs::create_dir_all(&dir)?;

        let backend = manager
            .make_backend(&options.with_path(&dir))
            .map_err(|err| ShardError::Io(err.to_string()))?;

        let name = format!("shard-{index}");
        let mut shard = Self {
            index,
            first_seq: cfg.first_seq(index),
            last_seq: cfg.last_seq(index),
            cfg,
            p_cache: NodeCache::new(&name, cache_size, cache_age),
            n_cache: KeyCache::new(cache_size, cache_age),
            backend,
            control: dir.join(CONTROL_FILE_NAME),
            dir,
            complete: false,
            stored_seqs: SeqRangeSet::new(),
            last_stored: None,
            file_size: 0,
            reader_id: basalt_ledger::next_source_id(),
        };

        if shard.backend.fd_limit() == 0 {
            // Non-persistent backend: no control file, transient state.
            return Ok(shard);
        }

        if is_new {
            shard.save_control()?;
        } else if shard.control.is_file() {
            let text = std::fs::read_to_string(&shard.control)?;
            let stored = SeqRangeSet::parse(&text).map_err(|err| ShardError::InvalidControl {
                index,
                detail: err.to_string(),
            })?;
            shard.stored_seqs = stored;
            if !shard.stored_seqs.is_empty() {
                let first = shard.stored_seqs.first().unwrap_or(0);
                let last = shard.stored_seqs.last().unwrap_or(u32::MAX);
                if first < shard.first_seq || last > shard.last_seq {
                    return Err(ShardError::InvalidControl {
                        index,
                        detail: format!(
                            "stored {first}-{last} outside range {}-{}",
                            shard.first_seq, shard.last_seq
                        ),
                    });
                }
                if shard.stored_seqs.len() == u64::from(cfg.num_ledgers(index)) {
                    debug!(index, "found control file for complete shard");
                    shard.stored_seqs.clear();
                    std::fs::remove_file(&shard.control)?;
                    shard.complete = true;
                }
            }
        } else {
            // Backend files but no control file: the shard finished.
            shard.complete = true;
        }
        shard.update_file_size()?;
        Ok(shard)
    }

    /// Returns the shard index.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the first ledger sequence of the shard range.
    #[must_use]
    pub fn first_seq(&self) -> u32 {
        self.first_seq
    }

    /// Returns the last ledger sequence of the shard range.
    #[must_use]
    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    /// Returns true if the shard has its entire range stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns the shard's positive cache.
    #[must_use]
    pub fn p_cache(&self) -> &Arc<NodeCache> {
        &self.p_cache
    }

    /// Returns the shard's negative cache.
    #[must_use]
    pub fn n_cache(&self) -> &Arc<KeyCache> {
        &self.n_cache
    }

    /// Returns both caches as a pair.
    #[must_use]
    pub fn caches(&self) -> CachePair {
        CachePair {
            positive: self.p_cache.clone(),
            negative: self.n_cache.clone(),
        }
    }

    /// Returns the shard's backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Returns the backend's file-descriptor footprint.
    #[must_use]
    pub fn fd_limit(&self) -> u32 {
        self.backend.fd_limit()
    }

    /// Returns the on-disk size of the shard directory in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the most recently stored ledger, kept as a difference
    /// anchor for the next copy.
    #[must_use]
    pub fn last_stored(&self) -> Option<&Arc<Ledger>> {
        self.last_stored.as_ref()
    }

    /// Returns how many ledgers are stored while acquiring.
    #[must_use]
    pub fn num_stored(&self) -> u64 {
        self.stored_seqs.len()
    }

    /// Returns the next ledger sequence the acquirer should request.
    ///
    /// Acquisition is descending: an empty shard starts at the top of its
    /// range, then the walk fills the greatest gap below the highest
    /// stored sequence before touching anything above it.
    #[must_use]
    pub fn prepare(&self) -> Option<u32> {
        if self.complete {
            return None;
        }
        let Some(top) = self.stored_seqs.last() else {
            return Some(self.last_seq);
        };
        self.stored_seqs
            .prev_missing_in(self.first_seq, top)
            .or_else(|| self.stored_seqs.prev_missing_in(self.first_seq, self.last_seq))
    }

    /// Returns true if the ledger at `seq` is stored here.
    #[must_use]
    pub fn has_ledger(&self, seq: u32) -> bool {
        if seq < self.first_seq || seq > self.last_seq {
            return false;
        }
        self.complete || self.stored_seqs.contains(seq)
    }

    /// Records that the ledger has been fully stored in this shard.
    ///
    /// The control file is rewritten (or, on completion, removed) before
    /// success is acknowledged, so a crash never leaves the persisted
    /// state more permissive than the acknowledged one. Returns false for
    /// duplicate or out-of-range sequences.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Io`] if the control file cannot be updated;
    /// the in-memory state is left unchanged.
    pub fn set_stored(&mut self, ledger: &Arc<Ledger>) -> Result<bool, ShardError> {
        debug_assert!(!self.complete);
        let seq = ledger.seq();
        if seq < self.first_seq || seq > self.last_seq {
            warn!(index = self.index, seq, "ledger outside shard range");
            return Ok(false);
        }

        let mut next = self.stored_seqs.clone();
        if !next.insert(seq) {
            error!(index = self.index, seq, "ledger already stored in shard");
            return Ok(false);
        }

        if next.len() == u64::from(self.cfg.num_ledgers(self.index)) {
            if self.backend.fd_limit() != 0 {
                std::fs::remove_file(&self.control)?;
            }
            self.complete = true;
            self.stored_seqs.clear();
            self.last_stored = None;
            self.update_file_size()?;
            debug!(index = self.index, "shard complete");
        } else {
            if self.backend.fd_limit() != 0 {
                std::fs::write(&self.control, next.to_string())?;
            }
            self.stored_seqs = next;
            self.last_stored = Some(ledger.clone());
            self.update_file_size()?;
        }
        debug!(index = self.index, seq, "ledger stored in shard");
        Ok(true)
    }

    /// Returns a standalone reader over this shard's backend and caches.
    #[must_use]
    pub fn reader(&self) -> ShardReader {
        ShardReader {
            id: self.reader_id,
            backend: self.backend.clone(),
            caches: self.caches(),
            stats: Arc::new(StoreStats::default()),
        }
    }

    /// Structurally validates every stored ledger, newest first.
    ///
    /// The walk is anchored at the hash `resolver` reports for the top of
    /// the range and follows `parent_hash` down. Each ledger's header is
    /// checked for hash and sequence consistency, its state trie is
    /// visited (as a structural difference against the successor when the
    /// chain links up), and its transaction trie is visited in full.
    /// During the walk the positive cache's age target is forced down to
    /// one second to cap memory, and restored on exit.
    pub fn validate(&self, resolver: &dyn LedgerHashResolver) -> ValidateOutcome {
        let saved_age = self.p_cache.set_target_age(Duration::from_secs(1));
        let outcome = self.validate_inner(resolver);
        self.p_cache.sweep();
        let _ = self.p_cache.set_target_age(saved_age);
        match outcome {
            ValidateOutcome::Valid => debug!(index = self.index, "shard valid"),
            ValidateOutcome::Invalid { seq, hash } => {
                error!(index = self.index, seq, %hash, "shard validation failed")
            }
            ValidateOutcome::Incomplete { seq, hash } => {
                debug!(index = self.index, seq, %hash, "shard incomplete")
            }
        }
        outcome
    }

    fn validate_inner(&self, resolver: &dyn LedgerHashResolver) -> ValidateOutcome {
        let Some(mut hash) = resolver.hash_of_seq(self.last_seq) else {
            return ValidateOutcome::Incomplete {
                seq: self.last_seq,
                hash: Hash::ZERO,
            };
        };
        let reader: Arc<dyn NodeSource> = Arc::new(self.reader());
        let mut seq = self.last_seq;
        let mut next: Option<Arc<Ledger>> = None;
        loop {
            let Some(object) = reader.node(&hash, seq) else {
                return ValidateOutcome::Incomplete { seq, hash };
            };
            let header = match LedgerHeader::from_prefixed_bytes(object.data()) {
                Ok(header) => header,
                Err(_) => return ValidateOutcome::Invalid { seq, hash },
            };
            if header.seq != seq || header.hash() != hash || header.account_hash.is_zero() {
                return ValidateOutcome::Invalid { seq, hash };
            }

            let ledger = Ledger::new(header, reader.clone());
            let state = ledger.state_trie();
            let walked = match &next {
                Some(successor) if successor.parent_hash() == hash => {
                    state.visit_differences(&successor.state_trie(), &mut |_| true)
                }
                _ => state.visit_nodes(&mut |_| true),
            };
            if walked.is_err() {
                return ValidateOutcome::Invalid { seq, hash };
            }
            if !header.tx_hash.is_zero() && ledger.tx_trie().visit_nodes(&mut |_| true).is_err() {
                return ValidateOutcome::Invalid { seq, hash };
            }

            if seq == self.first_seq {
                return ValidateOutcome::Valid;
            }
            hash = header.parent_hash;
            seq -= 1;
            next = Some(ledger);
        }
    }

    /// Recomputes the shard's on-disk footprint.
    fn update_file_size(&mut self) -> Result<(), ShardError> {
        self.file_size = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                self.file_size += entry.metadata()?.len();
            }
        }
        Ok(())
    }

    fn save_control(&self) -> Result<(), ShardError> {
        std::fs::write(&self.control, self.stored_seqs.to_string())?;
        Ok(())
    }
}

/// A lock-free reader over one shard's backend and caches.
///
/// Fetch paths snapshot this under the store lock and then read without
/// it; the backend and caches are safe for concurrent readers.
pub struct ShardReader {
    id: SourceId,
    backend: Arc<dyn Backend>,
    caches: CachePair,
    stats: Arc<StoreStats>,
}

impl NodeSource for ShardReader {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn node(&self, hash: &Hash, _seq: u32) -> Option<Arc<NodeObject>> {
        if let Some(object) = self.caches.positive.fetch(hash) {
            return Some(object);
        }
        if self.caches.negative.touch_if_exists(hash) {
            return None;
        }
        match fetch_internal(&self.stats, &*self.backend, hash) {
            Some(object) => Some(self.caches.positive.canonicalize(*hash, object)),
            None => {
                self.caches.negative.insert(*hash);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use basalt_ledger::SourceId;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::database::CACHE_TARGET_SIZE;
    use crate::testing::manager_with_filemem;

    struct NullSource;

    impl NodeSource for NullSource {
        fn source_id(&self) -> SourceId {
            0
        }

        fn node(&self, _hash: &Hash, _seq: u32) -> Option<Arc<NodeObject>> {
            None
        }
    }

    fn test_ledger(seq: u32) -> Arc<Ledger> {
        let header = basalt_ledger::LedgerHeader {
            seq,
            total_coins: 0,
            close_time: 0,
            parent_hash: Hash::digest(&(seq - 1).to_be_bytes()),
            account_hash: Hash::digest(&seq.to_be_bytes()),
            tx_hash: Hash::ZERO,
        };
        Ledger::new(header, Arc::new(NullSource))
    }

    fn small_cfg() -> ShardConfig {
        // Shard 0 holds [2, 8] (genesis-clamped), shard 1 holds [9, 16].
        ShardConfig::new(8, 2).unwrap()
    }

    fn open_shard(cfg: ShardConfig, index: u32, root: &TempDir) -> Result<Shard, ShardError> {
        let manager = manager_with_filemem();
        let options = BackendOptions::new("filemem", root.path());
        Shard::open(
            cfg,
            index,
            CACHE_TARGET_SIZE,
            Duration::from_secs(60),
            &manager,
            &options,
            root.path(),
        )
    }

    #[test]
    fn test_shard_index_arithmetic() {
        let cfg = ShardConfig::default();
        assert_eq!(cfg.ledgers_per_shard(), 16384);
        assert_eq!(cfg.genesis_seq(), 32570);

        // The genesis shard is index 1, clamped to [32570, 32768].
        assert_eq!(cfg.genesis_shard_index(), 1);
        assert_eq!(cfg.first_seq(1), 32570);
        assert_eq!(cfg.last_seq(1), 32768);
        assert_eq!(cfg.num_ledgers(1), 199);

        // Shard 2 is a full shard: [32769, 49152].
        assert_eq!(cfg.first_seq(2), 32769);
        assert_eq!(cfg.last_seq(2), 49152);
        assert_eq!(cfg.num_ledgers(2), 16384);

        assert_eq!(cfg.shard_index(32570), 1);
        assert_eq!(cfg.shard_index(32768), 1);
        assert_eq!(cfg.shard_index(32769), 2);
    }

    #[test]
    fn test_new_shard_writes_empty_control() {
        let root = tempdir().unwrap();
        let shard = open_shard(small_cfg(), 1, &root).unwrap();
        assert!(!shard.is_complete());
        assert_eq!(shard.prepare(), Some(16));

        let control = root.path().join("1").join(CONTROL_FILE_NAME);
        assert!(control.is_file());
        assert_eq!(std::fs::read_to_string(control).unwrap(), "");
    }

    #[test]
    fn test_set_stored_persists_before_acknowledging() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        let mut shard = open_shard(cfg, 1, &root).unwrap();
        let control = root.path().join("1").join(CONTROL_FILE_NAME);

        assert!(shard.set_stored(&test_ledger(16)).unwrap());
        assert_eq!(std::fs::read_to_string(&control).unwrap(), "16");
        assert!(shard.set_stored(&test_ledger(15)).unwrap());
        assert_eq!(std::fs::read_to_string(&control).unwrap(), "15-16");
        assert!(shard.has_ledger(15));
        assert!(!shard.has_ledger(14));
    }

    #[test]
    fn test_set_stored_rejects_duplicates_and_out_of_range() {
        let root = tempdir().unwrap();
        let mut shard = open_shard(small_cfg(), 1, &root).unwrap();

        assert!(shard.set_stored(&test_ledger(12)).unwrap());
        // Duplicate.
        assert!(!shard.set_stored(&test_ledger(12)).unwrap());
        assert_eq!(shard.num_stored(), 1);
        // Out of range for shard 1 ([9, 16]).
        assert!(!shard.set_stored(&test_ledger(8)).unwrap());
        assert!(!shard.set_stored(&test_ledger(17)).unwrap());
    }

    #[test]
    fn test_completion_removes_control_and_clears_set() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        let mut shard = open_shard(cfg, 1, &root).unwrap();
        let control = root.path().join("1").join(CONTROL_FILE_NAME);

        for seq in (9..=16).rev() {
            assert!(shard.set_stored(&test_ledger(seq)).unwrap());
        }
        assert!(shard.is_complete());
        assert_eq!(shard.num_stored(), 0);
        assert!(!control.exists());
        assert!(shard.prepare().is_none());
        // A complete shard serves its whole range.
        assert!(shard.has_ledger(9));
        assert!(shard.has_ledger(16));
    }

    #[test]
    fn test_reopen_reconstructs_stored_seqs() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        {
            let mut shard = open_shard(cfg, 1, &root).unwrap();
            shard.set_stored(&test_ledger(16)).unwrap();
            shard.set_stored(&test_ledger(14)).unwrap();
        }
        // Simulated crash: reopen from the control file alone.
        let shard = open_shard(cfg, 1, &root).unwrap();
        assert!(!shard.is_complete());
        assert_eq!(shard.num_stored(), 2);
        assert!(shard.has_ledger(16));
        assert!(shard.has_ledger(14));
        assert!(!shard.has_ledger(15));
        assert_eq!(shard.prepare(), Some(15));
    }

    #[test]
    fn test_reopen_without_control_is_complete() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        {
            let mut shard = open_shard(cfg, 1, &root).unwrap();
            for seq in (9..=16).rev() {
                shard.set_stored(&test_ledger(seq)).unwrap();
            }
            assert!(shard.is_complete());
        }
        let shard = open_shard(cfg, 1, &root).unwrap();
        assert!(shard.is_complete());
        assert_eq!(shard.num_stored(), 0);
    }

    #[test]
    fn test_stale_control_for_full_range_is_dropped() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        let dir = root.path().join("1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("nodes.dat"), b"x").unwrap();
        std::fs::write(dir.join(CONTROL_FILE_NAME), "9-16").unwrap();

        let shard = open_shard(cfg, 1, &root).unwrap();
        assert!(shard.is_complete());
        assert!(!dir.join(CONTROL_FILE_NAME).exists());
    }

    #[test]
    fn test_out_of_range_control_is_invalid() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        let dir = root.path().join("1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("nodes.dat"), b"x").unwrap();
        // 17 is beyond shard 1's last sequence.
        std::fs::write(dir.join(CONTROL_FILE_NAME), "12-17").unwrap();

        assert!(matches!(
            open_shard(cfg, 1, &root),
            Err(ShardError::InvalidControl { index: 1, .. })
        ));
    }

    #[test]
    fn test_prepare_fills_gap_below_highest_stored() {
        let root = tempdir().unwrap();
        let cfg = ShardConfig::new(500, 1).unwrap();
        let dir = root.path().join("0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("nodes.dat"), b"x").unwrap();
        std::fs::write(dir.join(CONTROL_FILE_NAME), "1-200,300-400").unwrap();

        let shard = open_shard(cfg, 0, &root).unwrap();
        assert!(!shard.is_complete());
        assert_eq!(shard.prepare(), Some(299));
    }

    #[test]
    fn test_memory_backend_writes_no_control() {
        let root = tempdir().unwrap();
        let cfg = small_cfg();
        let manager = manager_with_filemem();
        let options = BackendOptions::new(crate::backend::memory::MEMORY_BACKEND_NAME, root.path());
        let mut shard = Shard::open(
            cfg,
            1,
            CACHE_TARGET_SIZE,
            Duration::from_secs(60),
            &manager,
            &options,
            root.path(),
        )
        .unwrap();

        assert!(shard.set_stored(&test_ledger(16)).unwrap());
        assert!(!root.path().join("1").join(CONTROL_FILE_NAME).exists());
        assert!(shard.has_ledger(16));
    }

    #[test]
    fn test_validate_without_tip_is_incomplete() {
        struct NoTip;
        impl LedgerHashResolver for NoTip {
            fn hash_of_seq(&self, _seq: u32) -> Option<Hash> {
                None
            }
        }
        let root = tempdir().unwrap();
        let shard = open_shard(small_cfg(), 1, &root).unwrap();
        assert_eq!(
            shard.validate(&NoTip),
            ValidateOutcome::Incomplete {
                seq: 16,
                hash: Hash::ZERO
            }
        );
    }
}
