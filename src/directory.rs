//! Directory of an extendible hash index.
//!
//! The directory holds `2^global_depth` cells. Every cell stores the id of a
//! bucket; the buckets live in a separate table. Cells sharing a bucket form
//! one contiguous, aligned run of `2^(global_depth - local_depth)` cells.
//!
//! For example, with a global depth of 2 and a bucket `a` of local depth 1:
//! 00 -> a
//! 01 -> a
//! 10 -> b
//! 11 -> c

use crate::consts::{MAX_DEPTH, SNAPSHOT_SEPARATOR};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::ops::Range;

pub type BucketId = usize;

/// Index wide settings stored on the first line of a snapshot. Both decide
/// how the stored cells are read, so they are never taken from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub cluster_size: usize,
    pub max_depth: u32,
}

/// Where one block of a bucket lives and how full it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMetaData {
    /// `false` until the block has been written to disk.
    pub is_valid: bool,
    pub address: u64,
    pub valid_count: usize,
    pub local_depth: u32,
}

impl BlockMetaData {
    pub fn unallocated(local_depth: u32) -> Self {
        Self {
            is_valid: false,
            address: 0,
            valid_count: 0,
            local_depth,
        }
    }

    pub fn allocated(address: u64, valid_count: usize, local_depth: u32) -> Self {
        Self {
            is_valid: true,
            address,
            valid_count,
            local_depth,
        }
    }
}

/// A primary block followed by its overflow blocks. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    chain: Vec<BlockMetaData>,
}

impl Bucket {
    pub fn new(primary: BlockMetaData) -> Self {
        Self {
            chain: vec![primary],
        }
    }

    pub fn from_chain(chain: Vec<BlockMetaData>) -> Result<Self> {
        if chain.is_empty() {
            return Err(Error::Invariant("bucket chain without a primary block"));
        }
        Ok(Self { chain })
    }

    pub fn primary(&self) -> &BlockMetaData {
        &self.chain[0]
    }

    pub fn primary_mut(&mut self) -> &mut BlockMetaData {
        &mut self.chain[0]
    }

    pub fn overflow(&self) -> &[BlockMetaData] {
        &self.chain[1..]
    }

    pub fn overflow_mut(&mut self) -> &mut [BlockMetaData] {
        &mut self.chain[1..]
    }

    pub fn push_overflow(&mut self, meta: BlockMetaData) {
        self.chain.push(meta);
    }

    /// Primary first, then overflow blocks in chain order.
    pub fn chain(&self) -> &[BlockMetaData] {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut [BlockMetaData] {
        &mut self.chain
    }

    pub fn has_overflow(&self) -> bool {
        self.chain.len() > 1
    }

    pub fn local_depth(&self) -> u32 {
        self.primary().local_depth
    }

    pub fn record_count(&self) -> usize {
        self.chain.iter().map(|meta| meta.valid_count).sum()
    }
}

/// Directory index of `hash` using `bits` bits.
///
/// The bits are taken from position `max_depth - 1` downwards, so the result
/// is bits `max_depth - 1 ..= max_depth - bits` of the hash, most significant
/// first. Bits at or above `max_depth` never take part.
pub fn directory_index(hash: i32, bits: u32, max_depth: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    let shifted = (hash as u32) >> (max_depth - bits);
    (shifted & ((1u32 << bits) - 1)) as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    global_depth: u32,
    cells: Vec<BucketId>,
    buckets: BTreeMap<BucketId, Bucket>,
    next_id: BucketId,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// One cell pointing at a bucket that has not been written yet.
    pub fn new() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(0, Bucket::new(BlockMetaData::unallocated(0)));
        Self {
            global_depth: 0,
            cells: vec![0],
            buckets,
            next_id: 1,
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_at(&self, index: usize) -> BucketId {
        self.cells[index]
    }

    pub fn bucket(&self, id: BucketId) -> Result<&Bucket> {
        self.buckets.get(&id).ok_or(Error::Invariant("directory cell points at no bucket"))
    }

    pub fn bucket_mut(&mut self, id: BucketId) -> Result<&mut Bucket> {
        self.buckets
            .get_mut(&id)
            .ok_or(Error::Invariant("directory cell points at no bucket"))
    }

    /// Distinct buckets in directory order.
    pub fn buckets(&self) -> impl Iterator<Item = (BucketId, &Bucket)> + '_ {
        self.runs().into_iter().filter_map(move |run| {
            let id = self.cells[run.start];
            self.buckets.get(&id).map(|bucket| (id, bucket))
        })
    }

    /// Maximal runs of cells that share a bucket.
    fn runs(&self) -> Vec<Range<usize>> {
        let mut runs = vec![];
        let mut begin = 0;
        for i in 1..=self.cells.len() {
            if i == self.cells.len() || self.cells[i] != self.cells[begin] {
                runs.push(begin..i);
                begin = i;
            }
        }
        runs
    }

    /// Cells of the bucket with `local_depth` that contains `index`.
    pub fn range_of(&self, index: usize, local_depth: u32) -> Range<usize> {
        let size = 1usize << (self.global_depth - local_depth);
        let start = index & !(size - 1);
        start..start + size
    }

    /// Every cell is duplicated into two adjacent cells.
    pub fn double(&mut self) {
        self.cells = self.cells.iter().flat_map(|id| [*id, *id]).collect();
        self.global_depth += 1;
    }

    /// Registers `bucket` and points `cells` at it.
    pub fn add_bucket(&mut self, bucket: Bucket, cells: Range<usize>) -> BucketId {
        let id = self.next_id;
        self.next_id += 1;
        self.buckets.insert(id, bucket);
        for cell in &mut self.cells[cells] {
            *cell = id;
        }
        id
    }

    /// Points every cell of `absorbed` at `survivor` and forgets `absorbed`.
    pub fn absorb(&mut self, survivor: BucketId, absorbed: BucketId) -> Result<()> {
        self.buckets
            .remove(&absorbed)
            .ok_or(Error::Invariant("merged bucket is not registered"))?;
        for cell in self.cells.iter_mut().filter(|cell| **cell == absorbed) {
            *cell = survivor;
        }
        Ok(())
    }

    /// Halves the directory while no bucket needs the full global depth.
    /// Returns whether it shrank.
    pub fn try_compress(&mut self) -> bool {
        let mut shrunk = false;
        while self.global_depth > 0
            && self
                .buckets
                .values()
                .all(|bucket| bucket.local_depth() < self.global_depth)
        {
            self.cells = self.cells.iter().step_by(2).copied().collect();
            self.global_depth -= 1;
            shrunk = true;
        }
        shrunk
    }

    /// Text snapshot of the directory.
    ///
    /// ## Layout
    /// - First line: `cluster_size;directory_length;max_depth`
    /// - Then one line per run of cells sharing a bucket:
    ///   `begin;end;valid;address;count;depth[;valid;address;count;depth...]`
    ///   with `end` inclusive, `valid` as `1` or `0`, primary block first.
    pub fn to_snapshot(&self, header: SnapshotHeader) -> String {
        let sep = SNAPSHOT_SEPARATOR;
        let mut out = format!(
            "{}{sep}{}{sep}{}\n",
            header.cluster_size,
            self.cells.len(),
            header.max_depth
        );
        for run in self.runs() {
            out.push_str(&format!("{}{}{}", run.start, sep, run.end - 1));
            if let Some(bucket) = self.buckets.get(&self.cells[run.start]) {
                for meta in bucket.chain() {
                    out.push_str(&format!(
                        "{sep}{}{sep}{}{sep}{}{sep}{}",
                        u8::from(meta.is_valid),
                        meta.address,
                        meta.valid_count,
                        meta.local_depth,
                    ));
                }
            }
            out.push('\n');
        }
        out
    }

    /// Parses a snapshot, returning its header and the directory. A header
    /// line without a depth ceiling reads as [`MAX_DEPTH`].
    pub fn from_snapshot(text: &str) -> Result<(SnapshotHeader, Self)> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let first = lines
            .next()
            .ok_or_else(|| snapshot_error("missing header line"))?;
        let fields = parse_fields::<usize>(first)?;
        let (cluster_size, length, max_depth) = match fields[..] {
            [cluster_size, length] => (cluster_size, length, MAX_DEPTH),
            [cluster_size, length, max_depth] => (
                cluster_size,
                length,
                u32::try_from(max_depth).unwrap_or(u32::MAX),
            ),
            _ => return Err(snapshot_error(format!("bad header line `{}`", first))),
        };
        if !length.is_power_of_two() {
            return Err(snapshot_error(format!(
                "length {} is not a power of two",
                length
            )));
        }
        let global_depth = length.trailing_zeros();
        if !(1..=MAX_DEPTH).contains(&max_depth) || global_depth > max_depth {
            return Err(snapshot_error(format!(
                "max depth {} does not fit global depth {}",
                max_depth, global_depth
            )));
        }
        let header = SnapshotHeader {
            cluster_size,
            max_depth,
        };

        let mut directory = Self {
            global_depth,
            cells: vec![0; length],
            buckets: BTreeMap::new(),
            next_id: 0,
        };
        let mut covered = 0;
        for line in lines {
            let fields = parse_fields::<u64>(line)?;
            if fields.len() < 6 || (fields.len() - 2) % 4 != 0 {
                return Err(snapshot_error(format!("bad bucket line `{}`", line)));
            }
            let (begin, end) = (fields[0] as usize, fields[1] as usize);
            if begin != covered || end < begin || end >= length {
                return Err(snapshot_error(format!("run {}..={} out of order", begin, end)));
            }

            let chain = fields[2..]
                .chunks_exact(4)
                .map(|tuple| {
                    let is_valid = match tuple[0] {
                        0 => false,
                        1 => true,
                        other => return Err(snapshot_error(format!("bad valid flag {}", other))),
                    };
                    Ok(BlockMetaData {
                        is_valid,
                        address: tuple[1],
                        valid_count: tuple[2] as usize,
                        local_depth: tuple[3] as u32,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let bucket = Bucket::from_chain(chain)?;
            let local_depth = bucket.local_depth();
            if local_depth > global_depth
                || end - begin + 1 != 1 << (global_depth - local_depth)
            {
                return Err(snapshot_error(format!(
                    "run {}..={} does not match local depth {}",
                    begin, end, local_depth
                )));
            }
            directory.add_bucket(bucket, begin..end + 1);
            covered = end + 1;
        }
        if covered != length {
            return Err(snapshot_error(format!(
                "only {} of {} cells covered",
                covered, length
            )));
        }
        Ok((header, directory))
    }
}

fn snapshot_error(reason: impl Into<String>) -> Error {
    Error::corruption("directory snapshot", reason)
}

fn parse_fields<N: std::str::FromStr>(line: &str) -> Result<Vec<N>> {
    line.trim()
        .split(SNAPSHOT_SEPARATOR)
        .map(|field| {
            field
                .trim()
                .parse::<N>()
                .map_err(|_| snapshot_error(format!("bad field `{}` in `{}`", field, line)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_reads_bits_below_max_depth() {
        let hash = 0b1011 << 20;
        assert_eq!(directory_index(hash, 0, 24), 0);
        assert_eq!(directory_index(hash, 1, 24), 0b1);
        assert_eq!(directory_index(hash, 2, 24), 0b10);
        assert_eq!(directory_index(hash, 4, 24), 0b1011);
        // Bits above the window are ignored.
        assert_eq!(directory_index(-1 << 24, 4, 24), 0);
        assert_eq!(directory_index(0b110, 3, 3), 0b110);
    }

    #[test]
    fn double_and_compress_keep_runs() {
        let mut directory = Directory::new();
        directory.double();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.bucket_at(0), directory.bucket_at(1));

        directory.bucket_mut(0).unwrap().primary_mut().local_depth = 1;
        let upper = directory.add_bucket(Bucket::new(BlockMetaData::unallocated(1)), 1..2);
        assert_eq!(directory.range_of(1, 1), 1..2);
        assert!(!directory.try_compress());

        directory.absorb(0, upper).unwrap();
        directory.bucket_mut(0).unwrap().primary_mut().local_depth = 0;
        assert!(directory.try_compress());
        assert_eq!(directory.global_depth(), 0);
        assert_eq!(directory.bucket_count(), 1);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut directory = Directory::new();
        directory.double();
        directory.double();
        *directory.bucket_mut(0).unwrap().primary_mut() = BlockMetaData::allocated(0, 3, 1);
        let mut bucket = Bucket::new(BlockMetaData::allocated(128, 10, 2));
        bucket.push_overflow(BlockMetaData::allocated(0, 4, 2));
        directory.add_bucket(bucket, 2..3);
        directory.add_bucket(Bucket::new(BlockMetaData::unallocated(2)), 3..4);

        let header = SnapshotHeader {
            cluster_size: 128,
            max_depth: 24,
        };
        let text = directory.to_snapshot(header);
        assert_eq!(
            text,
            "128;4;24\n0;1;1;0;3;1\n2;2;1;128;10;2;1;0;4;2\n3;3;0;0;0;2\n"
        );

        let (restored_header, restored) = Directory::from_snapshot(&text).unwrap();
        assert_eq!(restored_header, header);
        assert_eq!(restored.to_snapshot(header), text);
        assert_eq!(restored.bucket(restored.bucket_at(2)).unwrap().record_count(), 14);
    }

    #[test]
    fn header_keeps_depth_ceiling() {
        let (header, directory) = Directory::from_snapshot("64;2;3\n0;1;1;0;5;0\n").unwrap();
        assert_eq!(header.max_depth, 3);
        assert_eq!(directory.global_depth(), 1);

        // Older snapshots without the ceiling read as the full window.
        let (header, _) = Directory::from_snapshot("64;1\n0;0;1;0;5;0\n").unwrap();
        assert_eq!(header.max_depth, MAX_DEPTH);

        for text in ["64;4;1\n0;3;1;0;5;0\n", "64;1;0\n0;0;1;0;5;0\n", "64;1;25\n0;0;0;0;0;0\n"] {
            assert!(matches!(
                Directory::from_snapshot(text),
                Err(Error::Corruption { .. })
            ));
        }
    }

    #[test]
    fn snapshot_with_gap_is_rejected() {
        let text = "128;2\n0;0;1;0;3;1\n";
        assert!(matches!(
            Directory::from_snapshot(text),
            Err(Error::Corruption { .. })
        ));
        let text = "128;3\n0;2;1;0;3;0\n";
        assert!(Directory::from_snapshot(text).is_err());
    }
}
