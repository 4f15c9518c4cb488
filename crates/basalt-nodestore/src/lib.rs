//! Content-addressed node object storage for basalt.
//!
//! Every piece of ledger history (headers and the nodes of the two
//! authenticated tries) is persisted as a [`NodeObject`] keyed by its
//! content digest. Two storage regimes share one read/write surface:
//!
//! - [`RotatingStore`]: a two-generation hot/cold backend pair with live
//!   promotion on read, for full history retention with bounded growth.
//! - [`ShardStore`]: fixed-width ledger range shards, independently
//!   acquired, verified and sealed as disk budget permits.
//!
//! Backends are pluggable through the [`Manager`] registry; the built-in
//! ones are an in-memory store and, behind the `rocksdb` feature, a
//! RocksDB store.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use basalt_ids::Hash;
//! use basalt_ledger::NodeType;
//! use basalt_nodestore::{MemBackend, NodeDb, RotatingStore};
//!
//! let store = RotatingStore::new(
//!     "example",
//!     MemBackend::new(),
//!     MemBackend::new(),
//!     1024,
//!     Duration::from_secs(60),
//!     0,
//! )
//! .unwrap();
//!
//! let data = b"node bytes".to_vec();
//! let hash = Hash::digest(&data);
//! store.store(NodeType::Leaf, data, hash, 1);
//! assert!(store.fetch(&hash, 1).is_some());
//! ```

mod backend;
mod cache;
mod config;
mod database;
mod error;
mod interval_set;
mod manager;
mod rotating;
mod shard;
mod shard_store;
pub mod testing;

pub use backend::memory::{MemBackend, MEMORY_BACKEND_NAME};
#[cfg(feature = "rocksdb")]
pub use backend::rocksdb::{RocksDbBackend, RocksDbConfig, ROCKSDB_BACKEND_NAME};
pub use backend::Backend;
pub use basalt_ledger::{NodeObject, NodeType};
pub use cache::{CachePair, KeyCache, NodeCache};
pub use config::StoreConfig;
pub use database::{
    AsyncFetch, NodeDb, ReadQueue, StoreStats, CACHE_TARGET_AGE, CACHE_TARGET_SIZE,
    MIN_SHARD_CACHE_SIZE,
};
pub use error::{BackendError, ConfigError, ShardError, StoreError};
pub use interval_set::{IntervalParseError, SeqRangeSet};
pub use manager::{BackendFactory, BackendOptions, Manager};
pub use rotating::RotatingStore;
pub use shard::{Shard, ShardConfig, ShardReader, ValidateOutcome, CONTROL_FILE_NAME};
pub use shard_store::ShardStore;
