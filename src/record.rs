use crate::error::Result;

/// A value with a fixed serialized width that can live in a block.
///
/// `PartialEq` is key equality: two records compare equal when they describe
/// the same key, even if their payloads differ. The index relies on this for
/// lookups and same-key updates.
pub trait Record: Clone + PartialEq {
    /// Serialized width in bytes. Every record of the type uses exactly this
    /// many bytes.
    const BYTE_SIZE: usize;

    /// Writes the record into `out`, which is exactly `BYTE_SIZE` long.
    fn write_bytes(&self, out: &mut [u8]);

    /// Parses a record from `bytes`, which is exactly `BYTE_SIZE` long.
    fn read_bytes(bytes: &[u8]) -> Result<Self>;

    /// 32-bit hash of the key. Only bits `max_depth - 1` down to 0 are read
    /// by the directory, so those need a good distribution.
    fn hash_code(&self) -> i32;
}
