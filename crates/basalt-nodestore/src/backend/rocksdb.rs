//! RocksDB-backed persistent backend.
//!
//! Enable with the `rocksdb` feature flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use basalt_ids::Hash;
use basalt_ledger::NodeObject;
use rocksdb::{DBCompactionStyle, DBCompressionType, IteratorMode, Options, WriteBatch, DB};

use crate::backend::{decode_blob, encode_blob, Backend};
use crate::error::BackendError;

/// Factory name of the RocksDB backend.
pub const ROCKSDB_BACKEND_NAME: &str = "rocksdb";

/// Default LRU cache size (256 MB).
const DEFAULT_CACHE_SIZE: usize = 256 * 1024 * 1024;

/// Default write buffer size (64 MB).
const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default max open files.
const DEFAULT_MAX_OPEN_FILES: i32 = 1024;

/// Configuration for the RocksDB backend.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: PathBuf,
    /// LRU cache size in bytes.
    pub cache_size: usize,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of open files.
    pub max_open_files: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./db"),
            cache_size: DEFAULT_CACHE_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

impl RocksDbConfig {
    /// Creates a new configuration with the given path.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_compaction_style(DBCompactionStyle::Level);
        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_level_compaction_dynamic_level_bytes(true);
        opts.increase_parallelism(num_cpus() as i32);
        opts
    }
}

/// A RocksDB-backed key→blob store.
pub struct RocksDbBackend {
    db: DB,
    fd_limit: u32,
}

impl RocksDbBackend {
    /// Opens a RocksDB backend with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the database cannot be opened.
    pub fn open(config: RocksDbConfig) -> Result<Arc<Self>, BackendError> {
        let opts = config.build_options();
        let db = DB::open(&opts, &config.path)
            .map_err(|e| BackendError::Io(format!("failed to open rocksdb: {e}")))?;
        let fd_limit = u32::try_from(config.max_open_files.max(1)).unwrap_or(u32::MAX);
        Ok(Arc::new(Self { db, fd_limit }))
    }

    /// Opens a RocksDB backend at the given path with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the database cannot be opened.
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, BackendError> {
        Self::open(RocksDbConfig::with_path(path))
    }
}

impl Backend for RocksDbBackend {
    fn name(&self) -> &str {
        ROCKSDB_BACKEND_NAME
    }

    fn fetch(&self, key: &Hash) -> Result<Option<Arc<NodeObject>>, BackendError> {
        let blob = self
            .db
            .get(key.as_bytes())
            .map_err(|e| BackendError::Io(e.to_string()))?;
        match blob {
            Some(blob) => decode_blob(key, &blob).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, object: &Arc<NodeObject>) -> Result<(), BackendError> {
        self.db
            .put(object.hash().as_bytes(), encode_blob(object))
            .map_err(|e| BackendError::Io(e.to_string()))
    }

    fn store_batch(&self, batch: &[Arc<NodeObject>]) -> Result<(), BackendError> {
        let mut write_batch = WriteBatch::default();
        for object in batch {
            write_batch.put(object.hash().as_bytes(), encode_blob(object));
        }
        self.db
            .write(write_batch)
            .map_err(|e| BackendError::Io(e.to_string()))
    }

    fn for_each(&self, f: &mut dyn FnMut(Arc<NodeObject>)) -> Result<(), BackendError> {
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, blob) = item.map_err(|e| BackendError::Io(e.to_string()))?;
            let hash = Hash::from_slice(&key)
                .map_err(|e| BackendError::Io(format!("bad stored key: {e}")))?;
            f(decode_blob(&hash, &blob)?);
        }
        Ok(())
    }

    fn write_load(&self) -> u64 {
        self.db
            .property_int_value("rocksdb.mem-table-flush-pending")
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    fn fd_limit(&self) -> u32 {
        self.fd_limit
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use basalt_ledger::NodeType;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_store_fetch_persistence() {
        let dir = tempdir().unwrap();
        let object = NodeObject::compute(NodeType::Account, vec![5, 6, 7]);

        {
            let backend = RocksDbBackend::open_default(dir.path()).unwrap();
            backend.store(&object).unwrap();
            let fetched = backend.fetch(object.hash()).unwrap().unwrap();
            assert_eq!(fetched.data(), object.data());
        }

        // Reopen and verify durability.
        let backend = RocksDbBackend::open_default(dir.path()).unwrap();
        let fetched = backend.fetch(object.hash()).unwrap().unwrap();
        assert_eq!(fetched.node_type(), NodeType::Account);
        assert!(backend.fd_limit() > 0);
    }

    #[test]
    fn test_batch_and_iteration() {
        let dir = tempdir().unwrap();
        let backend = RocksDbBackend::open_default(dir.path()).unwrap();

        let batch: Vec<_> = (0u8..8)
            .map(|i| NodeObject::compute(NodeType::Tx, vec![i, i]))
            .collect();
        backend.store_batch(&batch).unwrap();

        let mut seen = 0;
        backend.for_each(&mut |_| seen += 1).unwrap();
        assert_eq!(seen, 8);
    }
}
