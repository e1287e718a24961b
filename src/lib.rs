//! Persistent extendible hashing over fixed size block files.

mod block_stream;
mod bytes;
mod command;
mod consts;
mod execute;
mod parse;
mod repl;
mod setup;
mod stdin;

pub mod block;
pub mod block_file;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod hash_storage;
pub mod record;
pub mod tree;


pub use block::Block;
pub use block_file::BlockFile;
pub use bytes::hash_bytes;
pub use config::IndexOptions;
pub use consts::{block_factor, MAX_DEPTH};
pub use entry::Entry;
pub use error::{Error, Result};
pub use hash_storage::{HashStorage, Records};
pub use record::Record;
pub use repl::run_repl;
pub use setup::{init_tracing, ShellConfig};
pub use stdin::process_from_stdin;
pub use tree::AvlTree;
