use super::node::{BinaryTree, InOrder, LevelOrder, NodeId};
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Height balanced search tree without duplicates.
///
/// Balance factors are kept in every node as `height(right) - height(left)`
/// and stay within `-1..=1` after every public operation.
#[derive(Debug, Clone)]
pub struct AvlTree<T> {
    tree: BinaryTree<T>,
}

impl<T> Default for AvlTree<T> {
    fn default() -> Self {
        Self {
            tree: BinaryTree::default(),
        }
    }
}

impl<T: Ord> AvlTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    pub fn find(&self, data: &T) -> Option<&T> {
        self.tree.find(data)
    }

    pub fn contains(&self, data: &T) -> bool {
        self.tree.find_node(data).is_some()
    }

    pub fn min(&self) -> Result<&T> {
        self.tree.min()
    }

    pub fn max(&self) -> Result<&T> {
        self.tree.max()
    }

    pub fn iter(&self) -> InOrder<'_, T> {
        self.tree.iter()
    }

    pub fn level_order(&self) -> LevelOrder<'_, T> {
        self.tree.level_order()
    }

    pub fn insert(&mut self, data: T) -> Result<()> {
        let id = self.tree.insert_leaf(data)?;
        self.rebalance_after_insert(id)
    }

    /// Removes `data` and returns the stored value.
    pub fn delete(&mut self, data: &T) -> Result<T> {
        let mut id = self.tree.find_node(data).ok_or(Error::NotFound("tree value"))?;

        if let (Some(left), Some(_)) = (self.tree.nodes[id].left, self.tree.nodes[id].right) {
            let predecessor = self.tree.max_node(left);
            self.tree.swap_data(id, predecessor);
            id = predecessor;
        }

        let node = &self.tree.nodes[id];
        let child = node.left.or(node.right);
        let parent = node.parent;
        let from_left = parent.is_some_and(|p| self.tree.nodes[p].left == Some(id));

        self.tree.replace_child(parent, id, child)?;
        let node = &mut self.tree.nodes[id];
        node.left = None;
        node.right = None;
        node.parent = None;

        let (data, moved_from) = self.tree.remove_detached(id);
        let parent = parent.map(|p| if Some(p) == moved_from { id } else { p });
        if let Some(parent) = parent {
            self.rebalance_after_delete(parent, from_left)?;
        }
        Ok(data)
    }

    /// Replaces `old` with `new`. Equal keys swap the value in place,
    /// otherwise this is a delete followed by an insert.
    pub fn update(&mut self, old: &T, new: T) -> Result<()> {
        if old.cmp(&new) == Ordering::Equal {
            let id = self.tree.find_node(old).ok_or(Error::NotFound("tree value"))?;
            self.tree.nodes[id].data = new;
            return Ok(());
        }
        if !self.contains(old) {
            return Err(Error::NotFound("tree value"));
        }
        if self.contains(&new) {
            return Err(Error::Duplicate);
        }
        self.delete(old)?;
        self.insert(new)
    }

    fn balance(&self, id: NodeId) -> i8 {
        self.tree.nodes[id].balance
    }

    fn rebalance_after_insert(&mut self, mut child: NodeId) -> Result<()> {
        while let Some(parent) = self.tree.nodes[child].parent {
            if self.tree.nodes[parent].left == Some(child) {
                self.tree.nodes[parent].balance -= 1;
            } else {
                self.tree.nodes[parent].balance += 1;
            }
            match self.balance(parent) {
                0 => break,
                -1 | 1 => child = parent,
                _ => {
                    self.rotate(parent)?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Walks up from `node`, whose subtree on the `from_left` side just
    /// lost one level of height.
    fn rebalance_after_delete(&mut self, mut node: NodeId, mut from_left: bool) -> Result<()> {
        loop {
            self.tree.nodes[node].balance += if from_left { 1 } else { -1 };
            let subtree = match self.balance(node) {
                -1 | 1 => return Ok(()),
                0 => node,
                _ => {
                    let root = self.rotate(node)?;
                    if self.balance(root) != 0 {
                        return Ok(());
                    }
                    root
                }
            };
            let Some(parent) = self.tree.nodes[subtree].parent else {
                return Ok(());
            };
            from_left = self.tree.nodes[parent].left == Some(subtree);
            node = parent;
        }
    }

    /// Restores the balance of `id` with a single or double rotation and
    /// returns the new root of the subtree.
    fn rotate(&mut self, id: NodeId) -> Result<NodeId> {
        let balance = self.balance(id);
        if balance < -1 {
            let left = self.tree.nodes[id]
                .left
                .ok_or(Error::Invariant("left heavy node without left child"))?;
            if self.balance(left) > 0 {
                self.rotate_left(left)?;
            }
            self.rotate_right(id)
        } else if balance > 1 {
            let right = self.tree.nodes[id]
                .right
                .ok_or(Error::Invariant("right heavy node without right child"))?;
            if self.balance(right) < 0 {
                self.rotate_right(right)?;
            }
            self.rotate_left(id)
        } else {
            Ok(id)
        }
    }

    fn rotate_left(&mut self, x: NodeId) -> Result<NodeId> {
        let y = self.tree.nodes[x]
            .right
            .ok_or(Error::Invariant("left rotation without right child"))?;
        let parent = self.tree.nodes[x].parent;
        let inner = self.tree.nodes[y].left;

        self.tree.nodes[x].right = inner;
        if let Some(inner) = inner {
            self.tree.nodes[inner].parent = Some(x);
        }
        self.tree.replace_child(parent, x, Some(y))?;
        self.tree.nodes[y].left = Some(x);
        self.tree.nodes[x].parent = Some(y);

        let (xb, yb) = (self.balance(x), self.balance(y));
        let new_xb = xb - 1 - yb.max(0);
        let new_yb = yb - 1 + new_xb.min(0);
        self.tree.nodes[x].balance = new_xb;
        self.tree.nodes[y].balance = new_yb;
        Ok(y)
    }

    fn rotate_right(&mut self, x: NodeId) -> Result<NodeId> {
        let y = self.tree.nodes[x]
            .left
            .ok_or(Error::Invariant("right rotation without left child"))?;
        let parent = self.tree.nodes[x].parent;
        let inner = self.tree.nodes[y].right;

        self.tree.nodes[x].left = inner;
        if let Some(inner) = inner {
            self.tree.nodes[inner].parent = Some(x);
        }
        self.tree.replace_child(parent, x, Some(y))?;
        self.tree.nodes[y].right = Some(x);
        self.tree.nodes[x].parent = Some(y);

        let (xb, yb) = (self.balance(x), self.balance(y));
        let new_xb = xb + 1 - yb.min(0);
        let new_yb = yb + 1 + new_xb.max(0);
        self.tree.nodes[x].balance = new_xb;
        self.tree.nodes[y].balance = new_yb;
        Ok(y)
    }

    /// Checks ordering, parent links and that every stored balance factor
    /// matches the real subtree heights.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(root) = self.tree.root {
            if self.tree.nodes[root].parent.is_some() {
                return Err(Error::Invariant("root has a parent"));
            }
            let mut seen = 0;
            self.subtree_height(root, &mut seen)?;
            if seen != self.len() {
                return Err(Error::Invariant("unreachable nodes in arena"));
            }
        } else if !self.is_empty() {
            return Err(Error::Invariant("nodes without a root"));
        }

        let mut values = self.iter();
        if let Some(mut previous) = values.next() {
            for value in values {
                if previous >= value {
                    return Err(Error::Invariant("in-order traversal is not increasing"));
                }
                previous = value;
            }
        }
        Ok(())
    }

    fn subtree_height(&self, id: NodeId, seen: &mut usize) -> Result<i32> {
        *seen += 1;
        let node = &self.tree.nodes[id];
        let mut heights = [0i32; 2];
        for (slot, child) in [node.left, node.right].into_iter().enumerate() {
            if let Some(child) = child {
                if self.tree.nodes[child].parent != Some(id) {
                    return Err(Error::Invariant("child does not link back to parent"));
                }
                heights[slot] = self.subtree_height(child, seen)?;
            }
        }
        let balance = heights[1] - heights[0];
        if balance != node.balance as i32 || !(-1..=1).contains(&balance) {
            return Err(Error::Invariant("balance factor out of date or out of range"));
        }
        Ok(1 + heights[0].max(heights[1]))
    }
}

impl<'a, T: Ord> IntoIterator for &'a AvlTree<T> {
    type Item = &'a T;
    type IntoIter = InOrder<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
