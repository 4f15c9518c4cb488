//! Ledger primitives for basalt.
//!
//! A ledger is a versioned snapshot of global state: a header plus two
//! authenticated tries (account state and transactions) whose nodes are
//! content-addressed. This crate provides the header codec, the
//! [`NodeObject`] value stored for every trie node, and the trie walkers
//! the storage layer copies and validates with.

mod header;
mod ledger;
mod node_object;
mod trie;

pub use header::{HeaderError, LedgerHeader, LEDGER_HEADER_PREFIX};
pub use ledger::{next_source_id, Ledger, LedgerHashResolver, NodeSource, SourceId};
pub use node_object::{Batch, NodeObject, NodeObjectError, NodeType};
pub use trie::{BuiltTrie, NodeVisitor, Trie, TrieBuilder, TrieError, TrieNode, TRIE_FANOUT};
