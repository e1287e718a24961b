#![allow(dead_code)]

use rusty_ext_hash::directory::Directory;
use rusty_ext_hash::{Error, Record, Result};

/// 12-byte record hashed by its key, so tests choose the directory cell.
#[derive(Debug, Clone)]
pub struct Pair {
    pub key: i32,
    pub value: i64,
}

impl Pair {
    pub fn new(key: i32, value: i64) -> Self {
        Self { key, value }
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Record for Pair {
    const BYTE_SIZE: usize = 12;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.key.to_le_bytes());
        out[4..12].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_bytes(bytes: &[u8]) -> Result<Self> {
        let key = bytes.get(..4).and_then(|b| b.try_into().ok());
        let value = bytes.get(4..12).and_then(|b| b.try_into().ok());
        match (key, value) {
            (Some(key), Some(value)) => Ok(Self {
                key: i32::from_le_bytes(key),
                value: i64::from_le_bytes(value),
            }),
            _ => Err(Error::InvalidArgument("short pair".into())),
        }
    }

    fn hash_code(&self) -> i32 {
        self.key
    }
}

/// Key whose top `bits` bits of the 24-bit window are `prefix`.
pub fn key_with_prefix(prefix: u32, bits: u32, low: u32) -> i32 {
    ((prefix << (24 - bits)) | low) as i32
}

/// Checks the structural laws every directory must keep and returns the
/// total record count.
pub fn check_directory(
    directory: &Directory,
    block_factor: usize,
    overflow_factor: usize,
) -> usize {
    let global_depth = directory.global_depth();
    assert_eq!(directory.len(), 1 << global_depth);

    let mut total = 0;
    let mut covered = 0;
    let mut needs_full_depth = false;
    for (id, bucket) in directory.buckets() {
        let local_depth = bucket.local_depth();
        assert!(local_depth <= global_depth);
        needs_full_depth |= local_depth == global_depth;

        let run = 1usize << (global_depth - local_depth);
        assert_eq!(covered % run, 0, "bucket {} is not aligned", id);
        for cell in covered..covered + run {
            assert_eq!(directory.bucket_at(cell), id);
        }
        covered += run;

        assert!(bucket.primary().valid_count <= block_factor);
        for meta in bucket.overflow() {
            assert!(meta.is_valid);
            assert!(meta.valid_count <= overflow_factor);
        }
        total += bucket.record_count();
    }
    assert_eq!(covered, directory.len());
    if global_depth > 0 {
        assert!(needs_full_depth, "directory at depth {} could be halved", global_depth);
    }
    total
}
