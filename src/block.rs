use crate::bytes::read_u32;
use crate::consts::BLOCK_HEADER;
use crate::error::{Error, Result};
use crate::record::Record;

/// Rust representation of a block
///
/// ## Binary layout
///
/// - First 4 bytes are the record count (u32 LE)
/// - Followed by that many records, `T::BYTE_SIZE` bytes each, no padding
///
/// A block does not know its own address, the owner tracks that.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T> {
    records: Vec<T>,
}

impl<T> Default for Block<T> {
    fn default() -> Self {
        Self { records: vec![] }
    }
}

impl<T: Record> Block<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<T>) -> Self {
        Self { records }
    }

    pub fn add(&mut self, record: T) {
        self.records.push(record);
    }

    /// Removes the first record equal to `record`, returning it.
    pub fn remove(&mut self, record: &T) -> Option<T> {
        let position = self.records.iter().position(|r| r == record)?;
        Some(self.records.remove(position))
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.records.get(index)
    }

    pub fn find(&self, record: &T) -> Option<&T> {
        self.records.iter().find(|r| *r == record)
    }

    pub fn contains(&self, record: &T) -> bool {
        self.find(record).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    pub fn byte_size(&self) -> usize {
        BLOCK_HEADER + self.records.len() * T::BYTE_SIZE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.byte_size()];
        bytes[..BLOCK_HEADER].copy_from_slice(&(self.records.len() as u32).to_le_bytes());
        for (record, chunk) in self
            .records
            .iter()
            .zip(bytes[BLOCK_HEADER..].chunks_exact_mut(T::BYTE_SIZE))
        {
            record.write_bytes(chunk);
        }
        bytes
    }

    /// Parses a block from the start of `bytes`. Trailing bytes past the
    /// last record are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let count = read_u32(bytes, 0, "block")? as usize;
        let end = count
            .checked_mul(T::BYTE_SIZE)
            .and_then(|len| len.checked_add(BLOCK_HEADER))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Error::corruption(
                    "block",
                    format!("{} records do not fit into {} bytes", count, bytes.len()),
                )
            })?;

        let records = bytes[BLOCK_HEADER..end]
            .chunks_exact(T::BYTE_SIZE)
            .map(T::read_bytes)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }
}

impl<'a, T: Record> IntoIterator for &'a Block<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestRecord;

    #[test]
    fn byte_size_counts_prefix_and_records() {
        let mut block = Block::new();
        assert_eq!(block.byte_size(), 4);
        block.add(TestRecord::new(1, 10));
        block.add(TestRecord::new(2, 20));
        assert_eq!(block.byte_size(), 4 + 2 * TestRecord::BYTE_SIZE);
        assert_eq!(block.to_bytes().len(), block.byte_size());
    }

    #[test]
    fn remove_takes_first_equal_match() {
        let mut block = Block::new();
        block.add(TestRecord::new(1, 10));
        block.add(TestRecord::new(2, 20));
        block.add(TestRecord::new(1, 30));

        let removed = block.remove(&TestRecord::new(1, 0)).unwrap();
        assert_eq!(removed.value, 10);
        assert_eq!(block.len(), 2);
        assert_eq!(block.get(1).unwrap().value, 30);
        assert!(block.remove(&TestRecord::new(9, 0)).is_none());
    }

    #[test]
    fn parse_ignores_trailing_cluster_bytes() {
        let block = Block::from_records(vec![TestRecord::new(5, 50), TestRecord::new(6, 60)]);
        let mut bytes = block.to_bytes();
        bytes.resize(128, 0xAB);

        let parsed: Block<TestRecord> = Block::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get(0).unwrap().value, 50);
        assert_eq!(parsed.get(1).unwrap().value, 60);
    }

    #[test]
    fn count_larger_than_buffer_is_corruption() {
        let mut bytes = vec![0u8; 16];
        bytes[..4].copy_from_slice(&3u32.to_le_bytes());
        let parsed = Block::<TestRecord>::from_bytes(&bytes);
        assert!(matches!(parsed, Err(Error::Corruption { .. })));
    }
}
