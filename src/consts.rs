/// Bytes of the record-count prefix at the start of every block.
pub const BLOCK_HEADER: usize = 4;

/// Hard ceiling on the global depth of the directory.
pub const MAX_DEPTH: u32 = 24;

pub const DEFAULT_CLUSTER_SIZE: usize = 4096;

/// Overflow blocks are this many primary clusters wide.
pub const OVERFLOW_CLUSTER_MULTIPLIER: usize = 2;

/// Fixed part of a block file header: total size, max address, cluster size
/// and free address count.
pub const FILE_HEADER_FIXED: usize = 4 + 8 + 4 + 4;

pub const FREE_ADDRESS_LENGTH: usize = 8;

pub const PRIMARY_DATA_FILE: &str = "primary.blk";
pub const PRIMARY_HEADER_FILE: &str = "primary.hdr";
pub const OVERFLOW_DATA_FILE: &str = "overflow.blk";
pub const OVERFLOW_HEADER_FILE: &str = "overflow.hdr";
pub const DIRECTORY_FILE: &str = "directory.txt";

/// Field separator of the directory snapshot.
pub const SNAPSHOT_SEPARATOR: char = ';';

/// Number of records that fit into a block of `cluster_size` bytes.
pub fn block_factor(cluster_size: usize, record_size: usize) -> usize {
    cluster_size.saturating_sub(BLOCK_HEADER) / record_size
}
