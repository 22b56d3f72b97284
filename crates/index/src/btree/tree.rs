//! B-tree implementation.
//!
//! Insertion follows the single-pass top-down scheme: any full node met on
//! the way down is split before descending, so a leaf always has room for
//! the new key. Removal is lazy and never rebalances: a key in a leaf is
//! removed in place, a key in an internal node is kept as a tombstone
//! separator so the subtrees on either side stay correctly ordered.

use super::iter::Iter;
use super::node::{Node, NodeId};
use cinder_core::config::MIN_INDEX_DEGREE;
use cinder_core::{Error, Result};

/// An ordered map backed by a B-tree of minimum degree `t`.
#[derive(Clone, Debug)]
pub struct BTree<K, V> {
    /// Arena of all nodes. Nodes are never freed because removal never merges.
    pub(super) arena: Vec<Node<K, V>>,
    /// Root node ID, None until the first insert.
    pub(super) root: Option<NodeId>,
    /// Minimum degree.
    degree: usize,
    /// Number of live keys.
    len: usize,
}

impl<K: Ord + Clone, V> BTree<K, V> {
    /// Creates an empty tree of the given minimum degree.
    pub fn new(degree: usize) -> Result<Self> {
        if degree < MIN_INDEX_DEGREE {
            return Err(Error::invalid_config(format!(
                "b-tree degree must be at least {}, got {}",
                MIN_INDEX_DEGREE, degree
            )));
        }
        if degree.checked_mul(2).is_none() {
            return Err(Error::invalid_config(format!("b-tree degree {} too large", degree)));
        }
        Ok(Self {
            arena: Vec::new(),
            root: None,
            degree,
            len: 0,
        })
    }

    /// Assembles a tree from a prebuilt arena. Used by snapshot restore.
    pub(super) fn from_parts(arena: Vec<Node<K, V>>, root: Option<NodeId>, degree: usize) -> Self {
        let len = arena.iter().map(|n| n.live).sum();
        Self {
            arena,
            root,
            degree,
            len,
        }
    }

    /// Returns the minimum degree.
    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Returns the number of live keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no live key.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum keys per node.
    #[inline]
    fn max_keys(&self) -> usize {
        2 * self.degree - 1
    }

    /// Returns the number of levels, 0 for a tree without a root.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            height += 1;
            let node = &self.arena[id];
            current = if node.is_leaf { None } else { node.children.first().copied() };
        }
        height
    }

    /// Returns the node and position holding `key`, tombstone or not.
    fn locate(&self, key: &K) -> Option<(NodeId, usize)> {
        let mut current = self.root?;
        loop {
            let node = &self.arena[current];
            let pos = node.find_key_position(key);
            if pos < node.keys.len() && &node.keys[pos] == key {
                return Some((current, pos));
            }
            if node.is_leaf {
                return None;
            }
            current = node.children[pos];
        }
    }

    /// Returns the value stored under `key`.
    pub fn search(&self, key: &K) -> Option<&V> {
        let (node, pos) = self.locate(key)?;
        self.arena[node].values[pos].as_ref()
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        let (node, pos) = self.locate(key)?;
        self.arena[node].values[pos].as_mut()
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// Equal keys are never stored twice: an existing entry (or tombstone)
    /// is overwritten in place.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some((node_id, pos)) = self.locate(&key) {
            let node = &mut self.arena[node_id];
            let old = node.values[pos].replace(value);
            if old.is_none() {
                node.live += 1;
                self.len += 1;
            }
            return old;
        }

        let root = match self.root {
            Some(root) => root,
            None => {
                let id = self.alloc_node(Node::new_leaf());
                self.root = Some(id);
                id
            }
        };

        let start = if self.arena[root].key_count() == self.max_keys() {
            // Full root: grow the tree by one level.
            let new_root = self.alloc_node(Node::new_internal(root));
            self.split_child(new_root, 0);
            self.root = Some(new_root);
            new_root
        } else {
            root
        };

        self.insert_non_full(start, key, value);
        self.len += 1;
        None
    }

    /// Descends from a non-full node, splitting full children on the way.
    fn insert_non_full(&mut self, start: NodeId, key: K, value: V) {
        let max_keys = self.max_keys();
        let mut current = start;

        loop {
            if self.arena[current].is_leaf {
                let node = &mut self.arena[current];
                let pos = node.find_key_position(&key);
                node.keys.insert(pos, key);
                node.values.insert(pos, Some(value));
                node.live += 1;
                return;
            }

            let mut pos = self.arena[current].find_key_position(&key);
            let child = self.arena[current].children[pos];
            if self.arena[child].key_count() == max_keys {
                self.split_child(current, pos);
                if self.arena[current].keys[pos] < key {
                    pos += 1;
                }
            }
            current = self.arena[current].children[pos];
        }
    }

    /// Splits the full child at `index` of `parent` around its median key.
    fn split_child(&mut self, parent: NodeId, index: usize) {
        let t = self.degree;
        let child = self.arena[parent].children[index];

        let (median_key, median_value, right) = {
            let left = &mut self.arena[child];
            let right_keys = left.keys.split_off(t);
            let right_values = left.values.split_off(t);
            let right_children = if left.is_leaf {
                Vec::new()
            } else {
                left.children.split_off(t)
            };
            let median_key = left.keys.remove(t - 1);
            let median_value = left.values.remove(t - 1);
            left.recount();

            let mut right = Node {
                keys: right_keys,
                values: right_values,
                children: right_children,
                is_leaf: left.is_leaf,
                live: 0,
            };
            right.recount();
            (median_key, median_value, right)
        };

        let right_id = self.alloc_node(right);
        let node = &mut self.arena[parent];
        if median_value.is_some() {
            node.live += 1;
        }
        node.keys.insert(index, median_key);
        node.values.insert(index, median_value);
        node.children.insert(index + 1, right_id);
    }

    /// Lazily removes `key`, returning its value.
    ///
    /// No merge or borrow happens afterwards, so nodes may drop below the
    /// minimum occupancy.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (node_id, pos) = self.locate(key)?;
        let node = &mut self.arena[node_id];
        let removed = if node.is_leaf {
            node.keys.remove(pos);
            node.values.remove(pos)
        } else {
            node.values[pos].take()
        };
        if removed.is_some() {
            node.live -= 1;
            self.len -= 1;
        }
        removed
    }

    /// Removes `key` only when `is_empty` approves its current value.
    pub fn remove_if_empty<F>(&mut self, key: &K, is_empty: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        if self.search(key).map_or(false, is_empty) {
            self.remove(key)
        } else {
            None
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = None;
        self.len = 0;
    }

    /// Iterates live entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self)
    }

    /// Returns the live keys in ascending order.
    pub fn keys(&self) -> Vec<&K> {
        self.iter().map(|(k, _)| k).collect()
    }

    /// Checks the structural invariants: ascending keys, separator bounds,
    /// node capacity, child counts, uniform leaf depth and live counts.
    pub fn validate(&self) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => {
                return if self.len == 0 {
                    Ok(())
                } else {
                    Err(Error::invalid_snapshot("rootless tree reports live keys"))
                }
            }
        };

        let mut leaf_depth = None;
        let mut live = 0;
        // (node, depth, lower bound, upper bound)
        let mut stack: Vec<(NodeId, usize, Option<&K>, Option<&K>)> = vec![(root, 0, None, None)];

        while let Some((id, depth, lower, upper)) = stack.pop() {
            let node = self.arena.get(id).ok_or_else(|| {
                Error::invalid_snapshot(format!("dangling node reference {}", id))
            })?;

            if node.keys.len() > self.max_keys() {
                return Err(Error::invalid_snapshot(format!(
                    "node {} holds {} keys, more than {}",
                    id,
                    node.keys.len(),
                    self.max_keys()
                )));
            }
            if node.values.len() != node.keys.len() {
                return Err(Error::invalid_snapshot(format!(
                    "node {} has {} keys but {} values",
                    id,
                    node.keys.len(),
                    node.values.len()
                )));
            }
            if node.keys.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::invalid_snapshot(format!("node {} keys not ascending", id)));
            }
            if let (Some(lo), Some(first)) = (lower, node.keys.first()) {
                if first <= lo {
                    return Err(Error::invalid_snapshot(format!(
                        "node {} key below its separator",
                        id
                    )));
                }
            }
            if let (Some(hi), Some(last)) = (upper, node.keys.last()) {
                if last >= hi {
                    return Err(Error::invalid_snapshot(format!(
                        "node {} key above its separator",
                        id
                    )));
                }
            }
            let node_live = node.values.iter().filter(|v| v.is_some()).count();
            if node_live != node.live {
                return Err(Error::invalid_snapshot(format!(
                    "node {} live count {} does not match {}",
                    id, node.live, node_live
                )));
            }
            live += node_live;

            if node.is_leaf {
                if !node.children.is_empty() {
                    return Err(Error::invalid_snapshot(format!("leaf {} has children", id)));
                }
                if node.values.iter().any(|v| v.is_none()) {
                    return Err(Error::invalid_snapshot(format!("leaf {} holds a tombstone", id)));
                }
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(Error::invalid_snapshot("leaves at different depths"))
                    }
                    Some(_) => {}
                }
            } else {
                if node.children.len() != node.keys.len() + 1 {
                    return Err(Error::invalid_snapshot(format!(
                        "internal node {} has {} keys but {} children",
                        id,
                        node.keys.len(),
                        node.children.len()
                    )));
                }
                for (i, &child) in node.children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
                    let hi = if i == node.keys.len() { upper } else { Some(&node.keys[i]) };
                    stack.push((child, depth + 1, lo, hi));
                }
            }
        }

        if live != self.len {
            return Err(Error::invalid_snapshot(format!(
                "tree reports {} live keys, found {}",
                self.len, live
            )));
        }
        Ok(())
    }

    /// Returns true if every non-root node holds between `t - 1` and
    /// `2t - 1` keys. Holds for trees built by insertion only.
    pub fn is_balanced(&self) -> bool {
        let root = match self.root {
            Some(root) => root,
            None => return true,
        };
        let min = self.degree - 1;
        let max = self.max_keys();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            if id != root && (node.key_count() < min || node.key_count() > max) {
                return false;
            }
            stack.extend(node.children.iter().copied());
        }
        true
    }

    /// Allocates a new node in the arena and returns its ID.
    fn alloc_node(&mut self, node: Node<K, V>) -> NodeId {
        let id = self.arena.len();
        self.arena.push(node);
        id
    }
}
