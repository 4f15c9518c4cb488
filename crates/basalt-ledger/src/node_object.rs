//! The immutable value persisted for every stored object.

use std::sync::Arc;

use basalt_ids::Hash;
use thiserror::Error;

/// Classifies a stored object.
///
/// The discriminants are the stable wire bytes written in front of each
/// stored blob; they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    /// Unrecognized or legacy data.
    Unknown = 0,
    /// A serialized ledger header.
    Ledger = 1,
    /// An interior trie node.
    Inner = 2,
    /// A generic leaf node.
    Leaf = 3,
    /// An account-state leaf node.
    Account = 4,
    /// A transaction leaf node.
    Tx = 5,
}

impl NodeType {
    /// Returns the wire byte for this type.
    #[must_use]
    pub const fn wire_byte(self) -> u8 {
        self as u8
    }

    /// Maps a wire byte back to a type, yielding [`NodeType::Unknown`] for
    /// unrecognized values.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Self {
        match byte {
            1 => Self::Ledger,
            2 => Self::Inner,
            3 => Self::Leaf,
            4 => Self::Account,
            5 => Self::Tx,
            _ => Self::Unknown,
        }
    }

    /// Returns true if this type marks a trie leaf.
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf | Self::Account | Self::Tx)
    }
}

/// Errors that can occur constructing a [`NodeObject`].
#[derive(Debug, Error)]
pub enum NodeObjectError {
    /// The claimed hash does not match the digest of the data.
    #[error("hash mismatch: claimed {claimed}, digest {actual}")]
    HashMismatch { claimed: Hash, actual: Hash },
}

/// An immutable stored object: `(type, hash, bytes)`.
///
/// The hash is always the content digest of the bytes, so a `NodeObject`
/// can be re-keyed and re-verified from its payload alone. Objects are
/// shared behind `Arc`: caches, batches and in-flight reads all hold
/// references to the same instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeObject {
    node_type: NodeType,
    hash: Hash,
    data: Vec<u8>,
}

/// A group of objects stored together in one backend write.
pub type Batch = Vec<Arc<NodeObject>>;

impl NodeObject {
    /// Creates an object, computing its hash from the data.
    #[must_use]
    pub fn compute(node_type: NodeType, data: Vec<u8>) -> Arc<Self> {
        let hash = Hash::digest(&data);
        Arc::new(Self {
            node_type,
            hash,
            data,
        })
    }

    /// Creates an object with a caller-supplied hash.
    ///
    /// The hash is debug-checked against the digest of the data; release
    /// builds trust the caller.
    #[must_use]
    pub fn with_hash(node_type: NodeType, hash: Hash, data: Vec<u8>) -> Arc<Self> {
        debug_assert_eq!(hash, Hash::digest(&data), "node object key mismatch");
        Arc::new(Self {
            node_type,
            hash,
            data,
        })
    }

    /// Creates an object, verifying the supplied hash against the data.
    ///
    /// # Errors
    ///
    /// Returns [`NodeObjectError::HashMismatch`] if `hash` is not the
    /// digest of `data`.
    pub fn verified(
        node_type: NodeType,
        hash: Hash,
        data: Vec<u8>,
    ) -> Result<Arc<Self>, NodeObjectError> {
        let actual = Hash::digest(&data);
        if actual != hash {
            return Err(NodeObjectError::HashMismatch {
                claimed: hash,
                actual,
            });
        }
        Ok(Arc::new(Self {
            node_type,
            hash,
            data,
        }))
    }

    /// Returns the object's type.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Returns the object's key.
    #[must_use]
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Returns the object's payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_keys_by_digest() {
        let obj = NodeObject::compute(NodeType::Leaf, vec![1, 2, 3]);
        assert_eq!(*obj.hash(), Hash::digest(&[1, 2, 3]));
        assert_eq!(obj.node_type(), NodeType::Leaf);
        assert_eq!(obj.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_verified_rejects_bad_hash() {
        let bad = Hash::digest(b"something else");
        assert!(matches!(
            NodeObject::verified(NodeType::Tx, bad, vec![9, 9]),
            Err(NodeObjectError::HashMismatch { .. })
        ));

        let good = Hash::digest(&[9, 9]);
        assert!(NodeObject::verified(NodeType::Tx, good, vec![9, 9]).is_ok());
    }

    #[test]
    fn test_wire_byte_round_trip() {
        for t in [
            NodeType::Unknown,
            NodeType::Ledger,
            NodeType::Inner,
            NodeType::Leaf,
            NodeType::Account,
            NodeType::Tx,
        ] {
            assert_eq!(NodeType::from_wire(t.wire_byte()), t);
        }
        assert_eq!(NodeType::from_wire(0xFF), NodeType::Unknown);
    }
}
