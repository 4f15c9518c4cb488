//! Node store error types.

use std::io;

use basalt_ids::Hash;
use thiserror::Error;

/// Errors in store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured backend type is not registered.
    #[error("unknown backend type: {0}")]
    UnknownBackendType(String),

    /// No storage path was configured.
    #[error("missing storage path")]
    MissingPath,

    /// The disk budget is not usable.
    #[error("invalid max_size_gb: {0}")]
    InvalidMaxSize(u64),

    /// The shard width is not usable.
    #[error("invalid ledgers_per_shard: {0}")]
    InvalidLedgersPerShard(u32),

    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// The configuration file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors propagated from a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A stored blob's digest disagrees with its key.
    #[error("corrupt object {0}")]
    Corrupt(Hash),

    /// The backend has been closed.
    #[error("backend closed")]
    Closed,
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised by a shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The control file references sequences outside the shard range.
    #[error("shard {index}: invalid control file: {detail}")]
    InvalidControl { index: u32, detail: String },

    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A filesystem operation failed.
    #[error("shard I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for ShardError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised by a store façade.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A backend problem.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A shard problem.
    #[error(transparent)]
    Shard(#[from] ShardError),

    /// The directory scan found more than one incomplete shard.
    #[error("multiple incomplete shards: {0} and {1}")]
    MultipleIncomplete(u32, u32),

    /// A ledger with a zero hash or zero state root was offered.
    #[error("invalid ledger at seq {0}")]
    InvalidLedger(u32),

    /// A copy was attempted from a store into itself.
    #[error("source and destination stores are the same")]
    SameSource,

    /// A copy was offered for a sequence no shard is acquiring.
    #[error("ledger seq {0} is not being acquired")]
    NotAcquiring(u32),

    /// A node reachable from a copied ledger was missing at the source.
    #[error("ledger seq {seq}: missing node {hash}")]
    MissingNode { seq: u32, hash: Hash },

    /// A filesystem operation failed.
    #[error("store I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl StoreError {
    /// Maps a trie walk failure during copy or load to a store error.
    pub(crate) fn from_trie(seq: u32, err: basalt_ledger::TrieError) -> Self {
        match err {
            basalt_ledger::TrieError::MissingNode(hash)
            | basalt_ledger::TrieError::InvalidNode(hash) => Self::MissingNode { seq, hash },
        }
    }
}
