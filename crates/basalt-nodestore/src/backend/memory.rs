//! In-memory backend.
//!
//! Holds every blob in a `BTreeMap`. Reports `fd_limit() == 0`, so the
//! layers above treat it as non-persistent: no control files are written
//! and acquisition state is transient.

use std::collections::BTreeMap;
use std::sync::Arc;

use basalt_ids::Hash;
use basalt_ledger::NodeObject;
use parking_lot::RwLock;

use crate::backend::{decode_blob, encode_blob, Backend};
use crate::error::BackendError;

/// Factory name of the in-memory backend.
pub const MEMORY_BACKEND_NAME: &str = "memory";

/// An in-memory key→blob store.
#[derive(Debug, Default)]
pub struct MemBackend {
    data: RwLock<BTreeMap<Hash, Vec<u8>>>,
}

impl MemBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Backend for MemBackend {
    fn name(&self) -> &str {
        MEMORY_BACKEND_NAME
    }

    fn fetch(&self, key: &Hash) -> Result<Option<Arc<NodeObject>>, BackendError> {
        let data = self.data.read();
        match data.get(key) {
            Some(blob) => decode_blob(key, blob).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, object: &Arc<NodeObject>) -> Result<(), BackendError> {
        let blob = encode_blob(object);
        self.data.write().insert(*object.hash(), blob);
        Ok(())
    }

    fn store_batch(&self, batch: &[Arc<NodeObject>]) -> Result<(), BackendError> {
        let mut data = self.data.write();
        for object in batch {
            data.insert(*object.hash(), encode_blob(object));
        }
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Arc<NodeObject>)) -> Result<(), BackendError> {
        let snapshot: Vec<(Hash, Vec<u8>)> = self
            .data
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
        0
    }
}

#[cfg(test)]
mod tests {
    use basalt_ledger::NodeType;

    use super::*;

    #[test]
    fn test_store_fetch() {
        let backend = MemBackend::new();
        let object = NodeObject::compute(NodeType::Leaf, vec![1, 2, 3]);

        backend.store(&object).unwrap();
        let fetched = backend.fetch(object.hash()).unwrap().unwrap();
        assert_eq!(fetched.data(), object.data());
        assert_eq!(fetched.node_type(), NodeType::Leaf);

        assert!(backend.fetch(&Hash::digest(b"absent")).unwrap().is_none());
    }

    #[test]
    fn test_store_batch_and_for_each() {
        let backend = MemBackend::new();
        let batch: Vec<_> = (0u8..5)
            .map(|i| NodeObject::compute(NodeType::Tx, vec![i]))
            .collect();
        backend.store_batch(&batch).unwrap();
        assert_eq!(backend.len(), 5);

        let mut seen = 0;
        backend.for_each(&mut |_| seen += 1).unwrap();
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_reports_non_persistent() {
        let backend = MemBackend::new();
        assert_eq!(backend.fd_limit(), 0);
        assert_eq!(backend.write_load(), 0);
    }
}
