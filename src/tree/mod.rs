//! Search trees used as sorted tables and as the free list of block files.

mod avl;
mod node;

pub use avl::AvlTree;
pub use node::{BinaryTree, InOrder, LevelOrder};
