//! Content digest types for basalt.
//!
//! Every object persisted by the node store is addressed by the 256-bit
//! digest of its payload. This crate provides the [`Hash`] key type and the
//! digest function shared by the ledger and storage layers.

mod hash;

pub use hash::{Hash, HashError};

/// Length of a [`Hash`] in bytes.
pub const HASH_LEN: usize = 32;
