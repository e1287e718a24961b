//! Configuration of an extendible hash index.

use crate::consts::{block_factor, DEFAULT_CLUSTER_SIZE, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::record::Record;

/// Options for creating or opening an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Bytes per primary block. Overflow blocks are twice as wide. Ignored
    /// when opening an existing index, which keeps its stored cluster size.
    pub cluster_size: usize,
    /// Ceiling on the global depth. Once a full bucket sits at this depth,
    /// further records go to its overflow chain instead of splitting. It
    /// also picks the hash bits the directory reads, so it is stored with the
    /// index and ignored when opening an existing one.
    pub max_depth: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            cluster_size: DEFAULT_CLUSTER_SIZE,
            max_depth: MAX_DEPTH,
        }
    }
}

impl IndexOptions {
    pub fn with_cluster_size(cluster_size: usize) -> Self {
        Self {
            cluster_size,
            ..Self::default()
        }
    }

    pub fn max_depth(self, max_depth: u32) -> Self {
        Self { max_depth, ..self }
    }

    /// Checks that a block holds at least one `T` and that the depth ceiling
    /// fits the 24-bit indexing window.
    pub fn validate_for<T: Record>(&self) -> Result<()> {
        if T::BYTE_SIZE == 0 {
            return Err(Error::InvalidArgument("records must have a non-zero size".into()));
        }
        if block_factor(self.cluster_size, T::BYTE_SIZE) == 0 {
            return Err(Error::InvalidArgument(format!(
                "cluster size {} cannot hold a {} byte record",
                self.cluster_size,
                T::BYTE_SIZE
            )));
        }
        if i32::try_from(self.cluster_size * 2).is_err() {
            return Err(Error::InvalidArgument(format!(
                "cluster size {} is too large",
                self.cluster_size
            )));
        }
        if !(1..=MAX_DEPTH).contains(&self.max_depth) {
            return Err(Error::InvalidArgument(format!(
                "max depth {} is outside 1..={}",
                self.max_depth, MAX_DEPTH
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestRecord;

    #[test]
    fn defaults_are_valid() {
        IndexOptions::default().validate_for::<TestRecord>().unwrap();
        assert_eq!(IndexOptions::default().max_depth, 24);
    }

    #[test]
    fn rejects_tiny_clusters_and_deep_directories() {
        assert!(IndexOptions::with_cluster_size(15)
            .validate_for::<TestRecord>()
            .is_err());
        IndexOptions::with_cluster_size(16)
            .validate_for::<TestRecord>()
            .unwrap();
        assert!(IndexOptions::default()
            .max_depth(25)
            .validate_for::<TestRecord>()
            .is_err());
        assert!(IndexOptions::default()
            .max_depth(0)
            .validate_for::<TestRecord>()
            .is_err());
    }
}
