//! Test helpers shared by unit and integration tests.
//!
//! The [`FileMemFactory`] backend claims a file footprint (so the layers
//! above treat it as persistent and write control files) while keeping
//! blob contents in process memory, shared per path so a "reopened"
//! backend sees the same data.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use basalt_ids::Hash;
use basalt_ledger::{
    Ledger, LedgerHashResolver, LedgerHeader, NodeObject, NodeSource, NodeType, TrieBuilder,
};
use parking_lot::{Mutex, RwLock};

use crate::backend::{decode_blob, encode_blob, Backend};
use crate::database::NodeDb;
use crate::error::BackendError;
use crate::manager::{BackendFactory, BackendOptions, Manager};
use crate::rotating::RotatingStore;

/// Factory name of the persistent-claiming in-memory backend.
pub const FILEMEM_BACKEND_NAME: &str = "filemem";

type SharedBlobs = Arc<RwLock<BTreeMap<Hash, Vec<u8>>>>;

/// A backend factory whose instances report a file footprint but store
/// blobs in memory, keyed by path so reopening resumes the same data.
#[derive(Default)]
pub struct FileMemFactory {
    stores: Mutex<HashMap<PathBuf, SharedBlobs>>,
}

impl FileMemFactory {
    /// Creates a factory with no stores yet.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl BackendFactory for FileMemFactory {
    fn name(&self) -> &str {
        FILEMEM_BACKEND_NAME
    }

    fn open(&self, options: &BackendOptions) -> Result<Arc<dyn Backend>, BackendError> {
        std::fs::create_dir_all(&options.path)?;
        // Leave a backend file behind so the directory reads as used.
        let marker = options.path.join("nodes.dat");
        if !marker.is_file() {
            std::fs::write(&marker, b"filemem\n")?;
        }
        let blobs = self
            .stores
            .lock()
            .entry(options.path.clone())
            .or_default()
            .clone();
        let backend: Arc<dyn Backend> = Arc::new(FileMemBackend { blobs });
        Ok(backend)
    }
}

/// The backend type [`FileMemFactory`] creates.
pub struct FileMemBackend {
    blobs: SharedBlobs,
}

impl Backend for FileMemBackend {
    fn name(&self) -> &str {
        FILEMEM_BACKEND_NAME
    }

    fn fetch(&self, key: &Hash) -> Result<Option<Arc<NodeObject>>, BackendError> {
        match self.blobs.read().get(key) {
            Some(blob) => decode_blob(key, blob).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, object: &Arc<NodeObject>) -> Result<(), BackendError> {
        self.blobs.write().insert(*object.hash(), encode_blob(object));
        Ok(())
    }

    fn store_batch(&self, batch: &[Arc<NodeObject>]) -> Result<(), BackendError> {
        let mut blobs = self.blobs.write();
        for object in batch {
            blobs.insert(*object.hash(), encode_blob(object));
        }
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Arc<NodeObject>)) -> Result<(), BackendError> {
        let snapshot: Vec<(Hash, Vec<u8>)> = self
            .blobs
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        for (key, blob) in snapshot {
            f(decode_blob(&key, &blob)?);
        }
        Ok(())
    }

    fn write_load(&self) -> u64 {
        0
    }

    fn fd_limit(&self) -> u32 {
        3
    }
}

/// Returns a manager with the built-ins plus [`FileMemFactory`].
#[must_use]
pub fn manager_with_filemem() -> Arc<Manager> {
    let mut manager = Manager::new();
    manager.register(FileMemFactory::new());
    Arc::new(manager)
}

/// A hash resolver backed by a plain map.
#[derive(Default)]
pub struct MapResolver {
    hashes: Mutex<HashMap<u32, Hash>>,
}

impl MapResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the hash of the ledger at `seq`.
    pub fn set(&self, seq: u32, hash: Hash) {
        self.hashes.lock().insert(seq, hash);
    }
}

impl LedgerHashResolver for MapResolver {
    fn hash_of_seq(&self, seq: u32) -> Option<Hash> {
        self.hashes.lock().get(&seq).copied()
    }
}

/// Builds a ledger with small state and transaction tries and stores all
/// of its nodes (and its header) into `source`.
///
/// Account zero's balance varies with `seq` so consecutive ledgers share
/// most of their state trie but not all of it; transactions are unique
/// per ledger.
pub fn seed_ledger(
    source: &Arc<RotatingStore>,
    seq: u32,
    parent_hash: Hash,
    accounts: usize,
    txs: usize,
) -> Arc<Ledger> {
    let mut state = TrieBuilder::new(NodeType::Account);
    for i in 0..accounts {
        let key = Hash::digest(&(i as u64).to_be_bytes());
        let value = if i == 0 {
            format!("balance-{seq}")
        } else {
            format!("balance-{i}")
        };
        state.insert(key, value.into_bytes());
    }
    let state = state.build();

    let mut tx_builder = TrieBuilder::new(NodeType::Tx);
    for i in 0..txs {
        let key = Hash::digest(format!("tx-{seq}-{i}").as_bytes());
        tx_builder.insert(key, format!("payment-{i}").into_bytes());
    }
    let tx = tx_builder.build();

    for node in state.nodes.iter().chain(tx.nodes.iter()) {
        source.store(node.node_type(), node.data().to_vec(), *node.hash(), seq);
    }

    let header = LedgerHeader {
        seq,
        total_coins: 100_000_000_000,
        close_time: u64::from(seq) * 10,
        parent_hash,
        account_hash: state.root,
        tx_hash: tx.root,
    };
    source.store(
        NodeType::Ledger,
        header.to_prefixed_bytes(),
        header.hash(),
        seq,
    );

    let db: Arc<dyn NodeSource> = source.clone();
    Ledger::new(header, db)
}

/// Seeds a parent-linked chain of ledgers covering `first..=last`.
pub fn seed_chain(
    source: &Arc<RotatingStore>,
    first: u32,
    last: u32,
    accounts: usize,
    txs: usize,
) -> Vec<Arc<Ledger>> {
    let mut parent = Hash::digest(b"pre-genesis");
    let mut chain = Vec::with_capacity((last - first + 1) as usize);
    for seq in first..=last {
        let ledger = seed_ledger(source, seq, parent, accounts, txs);
        parent = ledger.hash();
        chain.push(ledger);
    }
    chain
}

/// A rotating store over two in-memory backends, convenient as a copy
/// source.
#[must_use]
pub fn mem_source(name: &str) -> Arc<RotatingStore> {
    RotatingStore::new(
        name,
        crate::backend::memory::MemBackend::new(),
        crate::backend::memory::MemBackend::new(),
        CACHE_SIZE,
        std::time::Duration::from_secs(300),
        0,
    )
    .unwrap_or_else(|_| unreachable!("in-memory store creation cannot fail"))
}

const CACHE_SIZE: usize = 4096;
