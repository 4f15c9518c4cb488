//! Authenticated 16-ary trie walkers.
//!
//! Trie nodes are content-addressed: an inner node stores up to sixteen
//! child hashes, a leaf stores its key and value, and every node's hash is
//! the digest of its stored bytes. The storage layer never mutates a trie
//! in place; it walks snapshots, either fully or as the structural
//! difference against another snapshot.

use std::sync::Arc;

use basalt_ids::Hash;
use thiserror::Error;

use crate::ledger::NodeSource;
use crate::node_object::{NodeObject, NodeType};

/// Number of children per inner node.
pub const TRIE_FANOUT: usize = 16;

/// Trie errors.
#[derive(Debug, Error)]
pub enum TrieError {
    /// A reachable node was not found in the backing source.
    #[error("trie node {0} missing")]
    MissingNode(Hash),

    /// A stored node failed to decode.
    #[error("trie node {0} malformed")]
    InvalidNode(Hash),
}

/// A decoded trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    /// An interior node holding child hashes; `None` marks an empty branch.
    Inner { children: [Option<Hash>; TRIE_FANOUT] },
    /// A leaf holding one keyed value.
    Leaf {
        node_type: NodeType,
        key: Hash,
        value: Vec<u8>,
    },
}

impl TrieNode {
    /// Serializes the node to its stored byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Inner { children } => {
                let mut out = Vec::with_capacity(1 + TRIE_FANOUT * 32);
                out.push(NodeType::Inner.wire_byte());
                for child in children {
                    match child {
                        Some(hash) => out.extend_from_slice(hash.as_bytes()),
                        None => out.extend_from_slice(&[0u8; 32]),
                    }
                }
                out
            }
            Self::Leaf {
                node_type,
                key,
                value,
            } => {
                let mut out = Vec::with_capacity(1 + 32 + value.len());
                out.push(node_type.wire_byte());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(value);
                out
            }
        }
    }

    /// Decodes a node from its stored byte form.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::InvalidNode`] when the bytes do not form a
    /// valid node. `hash` is only used for error reporting.
    pub fn decode(hash: &Hash, data: &[u8]) -> Result<Self, TrieError> {
        let (&tag, rest) = data
            .split_first()
            .ok_or(TrieError::InvalidNode(*hash))?;
        match NodeType::from_wire(tag) {
            NodeType::Inner => {
                if rest.len() != TRIE_FANOUT * 32 {
                    return Err(TrieError::InvalidNode(*hash));
                }
                let mut children = [None; TRIE_FANOUT];
                for (i, chunk) in rest.chunks_exact(32).enumerate() {
                    let child = Hash::from_slice(chunk)
                        .map_err(|_| TrieError::InvalidNode(*hash))?;
                    if !child.is_zero() {
                        children[i] = Some(child);
                    }
                }
                Ok(Self::Inner { children })
            }
            t if t.is_leaf() => {
                if rest.len() < 32 {
                    return Err(TrieError::InvalidNode(*hash));
                }
                let key = Hash::from_slice(&rest[..32])
                    .map_err(|_| TrieError::InvalidNode(*hash))?;
                Ok(Self::Leaf {
                    node_type: t,
                    key,
                    value: rest[32..].to_vec(),
                })
            }
            _ => Err(TrieError::InvalidNode(*hash)),
        }
    }

    /// Materializes the node as a stored object.
    #[must_use]
    pub fn to_object(&self) -> Arc<NodeObject> {
        let node_type = match self {
            Self::Inner { .. } => NodeType::Inner,
            Self::Leaf { node_type, .. } => *node_type,
        };
        NodeObject::compute(node_type, self.encode())
    }
}

/// Visitor callback: returns `false` to stop the walk early.
pub type NodeVisitor<'a> = dyn FnMut(&Arc<NodeObject>) -> bool + 'a;

/// A read-only trie snapshot rooted at a hash.
///
/// The trie pulls nodes through a [`NodeSource`]; `seq` tags every fetch
/// so the source can route it to the right storage.
#[derive(Clone)]
pub struct Trie {
    root: Hash,
    seq: u32,
    source: Arc<dyn NodeSource>,
}

impl Trie {
    /// Creates a snapshot rooted at `root`.
    #[must_use]
    pub fn new(root: Hash, seq: u32, source: Arc<dyn NodeSource>) -> Self {
        Self { root, seq, source }
    }

    /// Returns the root hash.
    #[must_use]
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// Returns true if the trie has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_zero()
    }

    fn node(&self, hash: &Hash) -> Result<Arc<NodeObject>, TrieError> {
        self.source
            .node(hash, self.seq)
            .ok_or(TrieError::MissingNode(*hash))
    }

    /// Walks every reachable node in pre-order.
    ///
    /// Returns `Ok(true)` when the walk covered the whole trie and
    /// `Ok(false)` when the visitor stopped it.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::MissingNode`] or [`TrieError::InvalidNode`] if
    /// the trie is not fully intact.
    pub fn visit_nodes(&self, f: &mut NodeVisitor<'_>) -> Result<bool, TrieError> {
        if self.is_empty() {
            return Ok(true);
        }
        self.visit_from(&self.root, f)
    }

    fn visit_from(&self, hash: &Hash, f: &mut NodeVisitor<'_>) -> Result<bool, TrieError> {
        let object = self.node(hash)?;
        if !f(&object) {
            return Ok(false);
        }
        if let TrieNode::Inner { children } = TrieNode::decode(hash, object.data())? {
            for child in children.into_iter().flatten() {
                if !self.visit_from(&child, f)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Walks exactly the nodes of `self` that are absent from `other`.
    ///
    /// Subtrees whose root hash matches on both sides are pruned without
    /// being fetched; with two adjacent ledger snapshots this touches only
    /// the nodes the newer ledger changed.
    ///
    /// # Errors
    ///
    /// Returns a [`TrieError`] if a node of `self` is missing or
    /// malformed. Damage on the `other` side is treated as absence: the
    /// corresponding subtree of `self` is walked in full.
    pub fn visit_differences(
        &self,
        other: &Trie,
        f: &mut NodeVisitor<'_>,
    ) -> Result<bool, TrieError> {
        if self.is_empty() {
            return Ok(true);
        }
        let theirs = if other.is_empty() {
            None
        } else {
            Some(*other.root())
        };
        self.diff_from(&self.root, theirs, other, f)
    }

    fn diff_from(
        &self,
        hash: &Hash,
        theirs: Option<Hash>,
        other: &Trie,
        f: &mut NodeVisitor<'_>,
    ) -> Result<bool, TrieError> {
        if theirs.as_ref() == Some(hash) {
            // Identical subtree on both sides.
            return Ok(true);
        }
        let object = self.node(hash)?;
        if !f(&object) {
            return Ok(false);
        }
        if let TrieNode::Inner { children } = TrieNode::decode(hash, object.data())? {
            let their_children = theirs
                .and_then(|h| other.source.node(&h, other.seq))
                .and_then(|obj| TrieNode::decode(obj.hash(), obj.data()).ok())
                .and_then(|node| match node {
                    TrieNode::Inner { children } => Some(children),
                    TrieNode::Leaf { .. } => None,
                })
                .unwrap_or([None; TRIE_FANOUT]);
            for (i, child) in children.into_iter().enumerate() {
                if let Some(child) = child {
                    if !self.diff_from(&child, their_children[i], other, f)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Builds a trie bottom-up, materializing every node as a stored object.
///
/// Used at ingest and in tests to produce the content-addressed node set
/// for a state or transaction snapshot.
#[derive(Debug)]
pub struct TrieBuilder {
    leaf_type: NodeType,
    entries: std::collections::BTreeMap<Hash, Vec<u8>>,
}

/// The output of [`TrieBuilder::build`].
#[derive(Debug)]
pub struct BuiltTrie {
    /// Root hash; zero for an empty trie.
    pub root: Hash,
    /// Every node of the trie, leaves and inner nodes alike.
    pub nodes: Vec<Arc<NodeObject>>,
}

impl TrieBuilder {
    /// Creates a builder whose leaves carry the given type.
    #[must_use]
    pub fn new(leaf_type: NodeType) -> Self {
        Self {
            leaf_type,
            entries: std::collections::BTreeMap::new(),
        }
    }

    /// Inserts a keyed value, replacing any previous value for the key.
    pub fn insert(&mut self, key: Hash, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries have been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the trie and returns its root and node set.
    #[must_use]
    pub fn build(self) -> BuiltTrie {
        let entries: Vec<(Hash, Vec<u8>)> = self.entries.into_iter().collect();
        let mut nodes = Vec::new();
        let root = match Self::build_subtree(self.leaf_type, &entries, 0, &mut nodes) {
            Some(hash) => hash,
            None => Hash::ZERO,
        };
        BuiltTrie { root, nodes }
    }

    fn build_subtree(
        leaf_type: NodeType,
        entries: &[(Hash, Vec<u8>)],
        depth: usize,
        out: &mut Vec<Arc<NodeObject>>,
    ) -> Option<Hash> {
        match entries {
            [] => None,
            [(key, value)] => {
                let leaf = TrieNode::Leaf {
                    node_type: leaf_type,
                    key: *key,
                    value: value.clone(),
                };
                let object = leaf.to_object();
                let hash = *object.hash();
                out.push(object);
                Some(hash)
            }
            _ => {
                let mut children: [Option<Hash>; TRIE_FANOUT] = [None; TRIE_FANOUT];
                let mut start = 0;
                while start < entries.len() {
                    let branch = nibble(&entries[start].0, depth);
                    let mut end = start + 1;
                    while end < entries.len() && nibble(&entries[end].0, depth) == branch {
                        end += 1;
                    }
                    children[branch as usize] =
                        Self::build_subtree(leaf_type, &entries[start..end], depth + 1, out);
                    start = end;
                }
                let inner = TrieNode::Inner { children };
                let object = inner.to_object();
                let hash = *object.hash();
                out.push(object);
                Some(hash)
            }
        }
    }
}

/// Returns the nibble of `key` at `depth`, high nibble first.
fn nibble(key: &Hash, depth: usize) -> u8 {
    let byte = key.as_bytes()[depth / 2];
    if depth % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::ledger::{next_source_id, NodeSource, SourceId};

    struct MapSource {
        id: SourceId,
        map: Mutex<HashMap<Hash, Arc<NodeObject>>>,
    }

    impl MapSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: next_source_id(),
                map: Mutex::new(HashMap::new()),
            })
        }

        fn add_all(&self, nodes: &[Arc<NodeObject>]) {
            let mut map = self.map.lock().unwrap();
            for node in nodes {
                map.insert(*node.hash(), node.clone());
            }
        }

        fn remove(&self, hash: &Hash) {
            self.map.lock().unwrap().remove(hash);
        }
    }

    impl NodeSource for MapSource {
        fn source_id(&self) -> SourceId {
            self.id
        }

        fn node(&self, hash: &Hash, _seq: u32) -> Option<Arc<NodeObject>> {
            self.map.lock().unwrap().get(hash).cloned()
        }
    }

    fn key(n: u64) -> Hash {
        Hash::digest(&n.to_be_bytes())
    }

    fn build_into(source: &Arc<MapSource>, items: &[(u64, &[u8])]) -> (Hash, usize) {
        let mut builder = TrieBuilder::new(NodeType::Account);
        for (k, v) in items {
            builder.insert(key(*k), v.to_vec());
        }
        let built = builder.build();
        source.add_all(&built.nodes);
        (built.root, built.nodes.len())
    }

    #[test]
    fn test_empty_trie() {
        let source = MapSource::new();
        let trie = Trie::new(Hash::ZERO, 1, source);
        assert!(trie.is_empty());
        let mut count = 0;
        assert!(trie.visit_nodes(&mut |_| { count += 1; true }).unwrap());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_visit_nodes_covers_everything() {
        let source = MapSource::new();
        let items: Vec<(u64, &[u8])> = (1..=16).map(|i| (i, b"value".as_slice())).collect();
        let (root, node_count) = build_into(&source, &items);

        let trie = Trie::new(root, 1, source);
        let mut seen = Vec::new();
        assert!(trie
            .visit_nodes(&mut |obj| {
                seen.push(*obj.hash());
                true
            })
            .unwrap());
        assert_eq!(seen.len(), node_count);
        // Root comes first in pre-order.
        assert_eq!(seen[0], root);
    }

    #[test]
    fn test_visitor_can_stop_early() {
        let source = MapSource::new();
        let items: Vec<(u64, &[u8])> = (1..=8).map(|i| (i, b"v".as_slice())).collect();
        let (root, _) = build_into(&source, &items);

        let trie = Trie::new(root, 1, source);
        let mut count = 0;
        let complete = trie
            .visit_nodes(&mut |_| {
                count += 1;
                count < 2
            })
            .unwrap();
        assert!(!complete);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_missing_node_is_an_error() {
        let source = MapSource::new();
        let items: Vec<(u64, &[u8])> = (1..=8).map(|i| (i, b"v".as_slice())).collect();
        let (root, _) = build_into(&source, &items);

        // Knock out a non-root node.
        let trie = Trie::new(root, 1, source.clone());
        let mut victim = None;
        trie.visit_nodes(&mut |obj| {
            if *obj.hash() != root {
                victim = Some(*obj.hash());
                return false;
            }
            true
        })
        .unwrap();
        source.remove(&victim.unwrap());

        assert!(matches!(
            trie.visit_nodes(&mut |_| true),
            Err(TrieError::MissingNode(_))
        ));
    }

    #[test]
    fn test_visit_differences_prunes_shared_subtrees() {
        let source = MapSource::new();
        let base: Vec<(u64, &[u8])> = (1..=64).map(|i| (i, b"same".as_slice())).collect();
        let (old_root, _) = build_into(&source, &base);

        // One modified entry; everything else identical.
        let mut changed = base.clone();
        changed[0] = (1, b"different".as_slice());
        let (new_root, _) = build_into(&source, &changed);
        assert_ne!(old_root, new_root);

        let new_trie = Trie::new(new_root, 2, source.clone());
        let old_trie = Trie::new(old_root, 1, source.clone());

        let mut diff_count = 0;
        assert!(new_trie
            .visit_differences(&old_trie, &mut |_| {
                diff_count += 1;
                true
            })
            .unwrap());

        let mut full_count = 0;
        new_trie
            .visit_nodes(&mut |_| {
                full_count += 1;
                true
            })
            .unwrap();

        assert!(diff_count > 0);
        assert!(
            diff_count < full_count,
            "difference walk ({diff_count}) should touch fewer nodes than a full walk ({full_count})"
        );
    }

    #[test]
    fn test_visit_differences_identical_roots() {
        let source = MapSource::new();
        let items: Vec<(u64, &[u8])> = (1..=8).map(|i| (i, b"v".as_slice())).collect();
        let (root, _) = build_into(&source, &items);

        let a = Trie::new(root, 2, source.clone());
        let b = Trie::new(root, 1, source);
        let mut count = 0;
        assert!(a.visit_differences(&b, &mut |_| { count += 1; true }).unwrap());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_visit_differences_against_empty_is_full_walk() {
        let source = MapSource::new();
        let items: Vec<(u64, &[u8])> = (1..=8).map(|i| (i, b"v".as_slice())).collect();
        let (root, node_count) = build_into(&source, &items);

        let a = Trie::new(root, 2, source.clone());
        let empty = Trie::new(Hash::ZERO, 1, source);
        let mut count = 0;
        assert!(a.visit_differences(&empty, &mut |_| { count += 1; true }).unwrap());
        assert_eq!(count, node_count);
    }

    #[test]
    fn test_node_encode_decode() {
        let leaf = TrieNode::Leaf {
            node_type: NodeType::Tx,
            key: key(9),
            value: vec![1, 2, 3],
        };
        let object = leaf.to_object();
        assert_eq!(object.node_type(), NodeType::Tx);
        let decoded = TrieNode::decode(object.hash(), object.data()).unwrap();
        assert_eq!(decoded, leaf);

        let inner = TrieNode::Inner {
            children: {
                let mut c = [None; TRIE_FANOUT];
                c[3] = Some(key(1));
                c[15] = Some(key(2));
                c
            },
        };
        let object = inner.to_object();
        assert_eq!(object.node_type(), NodeType::Inner);
        let decoded = TrieNode::decode(object.hash(), object.data()).unwrap();
        assert_eq!(decoded, inner);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let hash = key(0);
        assert!(matches!(
            TrieNode::decode(&hash, &[]),
            Err(TrieError::InvalidNode(_))
        ));
        assert!(matches!(
            TrieNode::decode(&hash, &[NodeType::Inner.wire_byte(), 0, 1]),
            Err(TrieError::InvalidNode(_))
        ));
        assert!(matches!(
            TrieNode::decode(&hash, &[NodeType::Ledger.wire_byte(); 40]),
            Err(TrieError::InvalidNode(_))
        ));
    }
}
