//! In-order B-tree iterator.

use super::node::NodeId;
use super::tree::BTree;

/// Iterator over live entries in ascending key order.
///
/// Tombstoned separators are stepped over but still drive the traversal.
pub struct Iter<'a, K, V> {
    tree: &'a BTree<K, V>,
    /// Pending (node, next key position) frames.
    stack: Vec<(NodeId, usize)>,
}

impl<'a, K: Ord + Clone, V> Iter<'a, K, V> {
    pub(super) fn new(tree: &'a BTree<K, V>) -> Self {
        let mut iter = Self {
            tree,
            stack: Vec::new(),
        };
        if let Some(root) = tree.root {
            iter.push_leftmost(root);
        }
        iter
    }

    /// Pushes `node` and its leftmost descendants.
    fn push_leftmost(&mut self, mut node: NodeId) {
        loop {
            self.stack.push((node, 0));
            let n = &self.tree.arena[node];
            if n.is_leaf {
                return;
            }
            node = n.children[0];
        }
    }
}

impl<'a, K: Ord + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some(frame) = self.stack.last_mut() {
            let (node_id, pos) = *frame;
            let node = &tree.arena[node_id];
            if pos >= node.keys.len() {
                self.stack.pop();
                continue;
            }
            frame.1 += 1;
            if !node.is_leaf {
                self.push_leftmost(node.children[pos + 1]);
            }
            if let Some(value) = node.values[pos].as_ref() {
                return Some((&node.keys[pos], value));
            }
        }
        None
    }
}
