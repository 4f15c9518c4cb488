//! The ledger value and its storage seams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basalt_ids::Hash;

use crate::header::LedgerHeader;
use crate::node_object::NodeObject;
use crate::trie::Trie;

/// Process-unique identity of a node source.
///
/// A ledger's tries carry a reference back to the database they read from;
/// comparing ids instead of pointers keeps that a plain back-reference
/// with no ownership cycle.
pub type SourceId = u64;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh [`SourceId`].
#[must_use]
pub fn next_source_id() -> SourceId {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Anything trie nodes can be fetched from.
///
/// Implemented by every store façade. `seq` tags each fetch with the
/// ledger it belongs to so sequence-routed stores can pick a backend.
pub trait NodeSource: Send + Sync {
    /// Returns this source's process-unique identity.
    fn source_id(&self) -> SourceId;

    /// Fetches a stored object by hash.
    fn node(&self, hash: &Hash, seq: u32) -> Option<Arc<NodeObject>>;
}

/// Resolves the hash of a validated ledger at a given sequence.
///
/// Shard validation needs one externally trusted hash to anchor its walk;
/// everything below the anchor follows `parent_hash` internally.
pub trait LedgerHashResolver {
    /// Returns the hash of the ledger at `seq`, if known.
    fn hash_of_seq(&self, seq: u32) -> Option<Hash>;
}

/// A ledger: a header plus handles onto its two authenticated tries.
///
/// The ledger does not own its trie nodes; it reads them on demand from
/// the [`NodeSource`] it was loaded from.
pub struct Ledger {
    header: LedgerHeader,
    source: Arc<dyn NodeSource>,
}

impl Ledger {
    /// Creates a ledger over the given source.
    #[must_use]
    pub fn new(header: LedgerHeader, source: Arc<dyn NodeSource>) -> Arc<Self> {
        Arc::new(Self { header, source })
    }

    /// Returns the header.
    #[must_use]
    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    /// Returns the ledger sequence.
    #[must_use]
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Returns the ledger hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Returns the parent ledger hash.
    #[must_use]
    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Returns the account-state trie root.
    #[must_use]
    pub fn account_hash(&self) -> Hash {
        self.header.account_hash
    }

    /// Returns the transaction trie root.
    #[must_use]
    pub fn tx_hash(&self) -> Hash {
        self.header.tx_hash
    }

    /// Returns the source this ledger reads from.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn NodeSource> {
        &self.source
    }

    /// Returns a snapshot of the account-state trie.
    #[must_use]
    pub fn state_trie(&self) -> Trie {
        Trie::new(self.header.account_hash, self.header.seq, self.source.clone())
    }

    /// Returns a snapshot of the transaction trie.
    #[must_use]
    pub fn tx_trie(&self) -> Trie {
        Trie::new(self.header.tx_hash, self.header.seq, self.source.clone())
    }
}
