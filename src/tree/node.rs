//! Arena-backed binary search tree with parent links.
//!
//! Nodes live in one `Vec` and refer to each other by index. Removing a node
//! moves the last node of the arena into the freed slot and patches the
//! links pointing at it, so the arena never has holes.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::VecDeque;

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct Node<T> {
    pub(crate) data: T,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) parent: Option<NodeId>,
    /// Height of the right subtree minus height of the left one.
    pub(crate) balance: i8,
}

impl<T> Node<T> {
    fn leaf(data: T, parent: Option<NodeId>) -> Self {
        Self {
            data,
            left: None,
            right: None,
            parent,
            balance: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinaryTree<T> {
    pub(crate) nodes: Vec<Node<T>>,
    pub(crate) root: Option<NodeId>,
}

impl<T> Default for BinaryTree<T> {
    fn default() -> Self {
        Self {
            nodes: vec![],
            root: None,
        }
    }
}

impl<T: Ord> BinaryTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub(crate) fn find_node(&self, data: &T) -> Option<NodeId> {
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            current = match data.cmp(&node.data) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    pub fn find(&self, data: &T) -> Option<&T> {
        self.find_node(data).map(|id| &self.nodes[id].data)
    }

    /// Plain BST insert, no rebalancing. Returns the id of the new leaf.
    pub(crate) fn insert_leaf(&mut self, data: T) -> Result<NodeId> {
        let mut parent = None;
        let mut go_left = false;
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            parent = Some(id);
            match data.cmp(&node.data) {
                Ordering::Less => {
                    go_left = true;
                    current = node.left;
                }
                Ordering::Greater => {
                    go_left = false;
                    current = node.right;
                }
                Ordering::Equal => return Err(Error::Duplicate),
            }
        }

        let id = self.nodes.len();
        self.nodes.push(Node::leaf(data, parent));
        match parent {
            None => self.root = Some(id),
            Some(p) if go_left => self.nodes[p].left = Some(id),
            Some(p) => self.nodes[p].right = Some(id),
        }
        Ok(id)
    }

    pub(crate) fn min_node(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    pub(crate) fn max_node(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    pub(crate) fn successor(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.nodes[id].right {
            return Some(self.min_node(right));
        }
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            if self.nodes[parent].left == Some(current) {
                return Some(parent);
            }
            current = parent;
        }
        None
    }

    pub fn min(&self) -> Result<&T> {
        let root = self.root.ok_or(Error::Empty)?;
        Ok(&self.nodes[self.min_node(root)].data)
    }

    pub fn max(&self) -> Result<&T> {
        let root = self.root.ok_or(Error::Empty)?;
        Ok(&self.nodes[self.max_node(root)].data)
    }

    /// Points `parent`'s link to `old` at `new` instead, or the root when
    /// `parent` is `None`, and fixes the back link of `new`.
    pub(crate) fn replace_child(
        &mut self,
        parent: Option<NodeId>,
        old: NodeId,
        new: Option<NodeId>,
    ) -> Result<()> {
        match parent {
            None => {
                if self.root != Some(old) {
                    return Err(Error::Invariant("parentless node is not the root"));
                }
                self.root = new;
            }
            Some(p) => {
                let node = &mut self.nodes[p];
                if node.left == Some(old) {
                    node.left = new;
                } else if node.right == Some(old) {
                    node.right = new;
                } else {
                    return Err(Error::Invariant("parent does not link back to child"));
                }
            }
        }
        if let Some(n) = new {
            self.nodes[n].parent = parent;
        }
        Ok(())
    }

    pub(crate) fn swap_data(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(high);
        std::mem::swap(&mut head[low].data, &mut tail[0].data);
    }

    /// Frees the slot of a node nothing links to any more.
    ///
    /// Returns the data and, when the last node of the arena was moved into
    /// the freed slot, that node's previous id.
    pub(crate) fn remove_detached(&mut self, id: NodeId) -> (T, Option<NodeId>) {
        let last = self.nodes.len() - 1;
        let removed = self.nodes.swap_remove(id);
        if id == last {
            return (removed.data, None);
        }

        let (parent, left, right) = {
            let moved = &self.nodes[id];
            (moved.parent, moved.left, moved.right)
        };
        match parent {
            None => self.root = Some(id),
            Some(p) => {
                let node = &mut self.nodes[p];
                if node.left == Some(last) {
                    node.left = Some(id);
                } else {
                    node.right = Some(id);
                }
            }
        }
        for child in [left, right].into_iter().flatten() {
            self.nodes[child].parent = Some(id);
        }
        (removed.data, Some(last))
    }

    /// In-order traversal, smallest first.
    pub fn iter(&self) -> InOrder<'_, T> {
        InOrder {
            tree: self,
            next: self.root.map(|root| self.min_node(root)),
        }
    }

    /// Breadth-first traversal starting at the root.
    pub fn level_order(&self) -> LevelOrder<'_, T> {
        LevelOrder {
            tree: self,
            queue: self.root.into_iter().collect(),
        }
    }
}

pub struct InOrder<'a, T> {
    tree: &'a BinaryTree<T>,
    next: Option<NodeId>,
}

impl<'a, T: Ord> Iterator for InOrder<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        Some(&self.tree.nodes[id].data)
    }
}

pub struct LevelOrder<'a, T> {
    tree: &'a BinaryTree<T>,
    queue: VecDeque<NodeId>,
}

impl<'a, T> Iterator for LevelOrder<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let node = &self.tree.nodes[id];
        self.queue.extend(node.left);
        self.queue.extend(node.right);
        Some(&node.data)
    }
}
