//! Little-endian helpers shared by the on-disk codecs.

use crate::error::{Error, Result};
use twox_hash::XxHash32;

const HASH_SEED: u32 = 0;

/// Default hash code for records keyed by raw bytes.
///
/// xxHash spreads entropy over all 32 bits, so the top bits the directory
/// reads are as good as the low ones.
pub fn hash_bytes(bytes: &[u8]) -> i32 {
    XxHash32::oneshot(HASH_SEED, bytes) as i32
}

fn take<const N: usize>(bytes: &[u8], offset: usize, what: &'static str) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            Error::corruption(
                what,
                format!("need {} bytes at offset {}, have {}", N, offset, bytes.len()),
            )
        })
}

pub fn read_u32(bytes: &[u8], offset: usize, what: &'static str) -> Result<u32> {
    Ok(u32::from_le_bytes(take(bytes, offset, what)?))
}

pub fn read_i32(bytes: &[u8], offset: usize, what: &'static str) -> Result<i32> {
    Ok(i32::from_le_bytes(take(bytes, offset, what)?))
}

pub fn read_i64(bytes: &[u8], offset: usize, what: &'static str) -> Result<i64> {
    Ok(i64::from_le_bytes(take(bytes, offset, what)?))
}
