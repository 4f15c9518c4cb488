//! The key→blob backend contract.

use std::sync::Arc;

use basalt_ids::Hash;
use basalt_ledger::{NodeObject, NodeType};

use crate::error::BackendError;

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

/// A pluggable key→blob store.
///
/// Backends support concurrent readers with serialized writers; the store
/// façades provide the serialization. A backend reporting `fd_limit() == 0`
/// keeps no files and its contents are not crash-durable; shards never
/// write control files on top of such a backend.
pub trait Backend: Send + Sync {
    /// Returns the factory name this backend was created from.
    fn name(&self) -> &str;

    /// Fetches a stored object by key. No side effects.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Corrupt`] when the stored blob does not
    /// digest to its key, and [`BackendError::Io`] on read failure. A
    /// missing key is `Ok(None)`, not an error.
    fn fetch(&self, key: &Hash) -> Result<Option<Arc<NodeObject>>, BackendError>;

    /// Stores one object, durable on return or on backend flush.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] on write failure.
    fn store(&self, object: &Arc<NodeObject>) -> Result<(), BackendError>;

    /// Stores a group of objects.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] on write failure.
    fn store_batch(&self, batch: &[Arc<NodeObject>]) -> Result<(), BackendError>;

    /// Visits every stored object.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if iteration fails or a blob is corrupt.
    fn for_each(&self, f: &mut dyn FnMut(Arc<NodeObject>)) -> Result<(), BackendError>;

    /// Pending write pressure, for admission and scheduling decisions.
    fn write_load(&self) -> u64;

    /// Reported file-descriptor usage; `0` marks a non-persistent backend.
    fn fd_limit(&self) -> u32;
}

/// Encodes an object to its stored blob: one type byte plus the payload.
#[must_use]
pub(crate) fn encode_blob(object: &NodeObject) -> Vec<u8> {
    let mut blob = Vec::with_capacity(1 + object.data().len());
    blob.push(object.node_type().wire_byte());
    blob.extend_from_slice(object.data());
    blob
}

/// Decodes a stored blob back into an object, verifying its key.
///
/// # Errors
///
/// Returns [`BackendError::Corrupt`] if the blob is empty or its payload
/// does not digest to `key`.
pub(crate) fn decode_blob(key: &Hash, blob: &[u8]) -> Result<Arc<NodeObject>, BackendError> {
    let (&tag, data) = blob.split_first().ok_or(BackendError::Corrupt(*key))?;
    let node_type = NodeType::from_wire(tag);
    NodeObject::verified(node_type, *key, data.to_vec())
        .map_err(|_| BackendError::Corrupt(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_round_trip() {
        let object = NodeObject::compute(NodeType::Account, vec![10, 20, 30]);
        let blob = encode_blob(&object);
        assert_eq!(blob.len(), 4);

        let decoded = decode_blob(object.hash(), &blob).unwrap();
        assert_eq!(decoded.node_type(), NodeType::Account);
        assert_eq!(decoded.data(), object.data());
        assert_eq!(decoded.hash(), object.hash());
    }

    #[test]
    fn test_decode_detects_corruption() {
        let object = NodeObject::compute(NodeType::Leaf, vec![1, 2, 3, 4]);
        let mut blob = encode_blob(&object);
        blob[2] ^= 0x40;
        assert!(matches!(
            decode_blob(object.hash(), &blob),
            Err(BackendError::Corrupt(_))
        ));
        assert!(matches!(
            decode_blob(object.hash(), &[]),
            Err(BackendError::Corrupt(_))
        ));
    }
}
