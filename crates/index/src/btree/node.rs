//! B-tree node definitions.

/// Node identifier in the B-tree arena.
pub type NodeId = usize;

/// A node in the B-tree.
///
/// Every key carries its value in the same node (this is a classic B-tree,
/// not a B+tree). A value slot holding `None` is a tombstone: the key is kept
/// as a separator after a lazy removal from an internal node.
#[derive(Clone, Debug)]
pub struct Node<K, V> {
    /// Keys stored in this node, strictly ascending.
    pub keys: Vec<K>,
    /// Values parallel to `keys`.
    pub values: Vec<Option<V>>,
    /// For internal nodes: `keys.len() + 1` child node IDs.
    /// For leaf nodes: empty.
    pub children: Vec<NodeId>,
    /// Whether this is a leaf node.
    pub is_leaf: bool,
    /// Number of keys whose value is present.
    pub live: usize,
}

impl<K: Ord, V> Node<K, V> {
    /// Creates a new leaf node.
    pub fn new_leaf() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            is_leaf: true,
            live: 0,
        }
    }

    /// Creates a new internal node with a single child.
    pub fn new_internal(first_child: NodeId) -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            children: vec![first_child],
            is_leaf: false,
            live: 0,
        }
    }

    /// Returns the number of keys in this node, tombstones included.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if this node holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finds the position of the first key not less than `key`.
    #[inline]
    pub fn find_key_position(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Finds the exact position of a key, or None if not found.
    pub fn find_key(&self, key: &K) -> Option<usize> {
        let pos = self.find_key_position(key);
        if pos < self.keys.len() && &self.keys[pos] == key {
            Some(pos)
        } else {
            None
        }
    }

    /// Recomputes the live-key count from the value slots.
    pub(crate) fn recount(&mut self) {
        self.live = self.values.iter().filter(|v| v.is_some()).count();
    }
}
