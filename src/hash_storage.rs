//! Extendible hashing storage.

use crate::block::Block;
use crate::block_file::BlockFile;
use crate::config::IndexOptions;
use crate::consts::*;
use crate::directory::{
    directory_index, BlockMetaData, Bucket, BucketId, Directory, SnapshotHeader,
};
use crate::error::{Error, Result};
use crate::record::Record;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Disk resident extendible hash index over records of type `T`.
///
/// Keys are unique: records that compare equal describe the same key.
pub struct HashStorage<T> {
    /// Directory holding every file of the index.
    ///
    /// ## Files
    /// - `primary.blk` / `primary.hdr`: primary buckets, one cluster each
    /// - `overflow.blk` / `overflow.hdr`: overflow blocks, two clusters each
    /// - `directory.txt`: snapshot of the directory, written on close
    path: PathBuf,

    /// Bytes per primary block.
    cluster_size: usize,

    /// Ceiling on the global depth, see [`IndexOptions::max_depth`].
    max_depth: u32,

    /// Maps the top bits of a hash to a bucket.
    ///
    /// For example if the global depth is 3, with bits taken from position
    /// `max_depth - 1` downwards:
    /// 000 -> cell 0
    /// 001 -> cell 1
    /// 010 -> cell 2
    /// ... and so on
    directory: Directory,

    /// Primary blocks, `cluster_size` bytes each.
    primary: BlockFile,

    /// Overflow blocks, `2 * cluster_size` bytes each.
    overflow: BlockFile,

    _record: PhantomData<T>,
}

impl<T: Record> HashStorage<T> {
    /// Creates an empty index in `path`, replacing any index files there.
    pub async fn create(path: impl AsRef<Path>, options: IndexOptions) -> Result<Self> {
        options.validate_for::<T>()?;
        let path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path).await?;

        let primary = BlockFile::create(
            path.join(PRIMARY_DATA_FILE),
            path.join(PRIMARY_HEADER_FILE),
            options.cluster_size,
        )
        .await?;
        let overflow = BlockFile::create(
            path.join(OVERFLOW_DATA_FILE),
            path.join(OVERFLOW_HEADER_FILE),
            options.cluster_size * OVERFLOW_CLUSTER_MULTIPLIER,
        )
        .await?;

        debug!(path = %path.display(), cluster_size = options.cluster_size, "created index");
        Ok(Self {
            path,
            cluster_size: options.cluster_size,
            max_depth: options.max_depth,
            directory: Directory::new(),
            primary,
            overflow,
            _record: PhantomData,
        })
    }

    /// Restores an index from the snapshot and headers in `path`.
    ///
    /// The stored cluster size and depth ceiling win over `options`: both
    /// decide where records live, so the index keeps the values it was
    /// written with.
    pub async fn open(path: impl AsRef<Path>, options: IndexOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = tokio::fs::read_to_string(path.join(DIRECTORY_FILE)).await?;
        let (header, directory) = Directory::from_snapshot(&snapshot)?;
        if header.max_depth != options.max_depth {
            debug!(
                requested = options.max_depth,
                stored = header.max_depth,
                "using stored max depth"
            );
        }

        let options = IndexOptions {
            cluster_size: header.cluster_size,
            max_depth: header.max_depth,
        };
        options.validate_for::<T>()?;
        let cluster_size = options.cluster_size;

        let primary =
            BlockFile::open(path.join(PRIMARY_DATA_FILE), path.join(PRIMARY_HEADER_FILE)).await?;
        let overflow =
            BlockFile::open(path.join(OVERFLOW_DATA_FILE), path.join(OVERFLOW_HEADER_FILE)).await?;
        if primary.cluster_size() != cluster_size
            || overflow.cluster_size() != cluster_size * OVERFLOW_CLUSTER_MULTIPLIER
        {
            return Err(Error::corruption(
                "index",
                format!(
                    "cluster sizes {} and {} do not match snapshot cluster size {}",
                    primary.cluster_size(),
                    overflow.cluster_size(),
                    cluster_size
                ),
            ));
        }

        debug!(
            path = %path.display(),
            cluster_size,
            global_depth = directory.global_depth(),
            buckets = directory.bucket_count(),
            "opened index"
        );
        Ok(Self {
            path,
            cluster_size,
            max_depth: options.max_depth,
            directory,
            primary,
            overflow,
            _record: PhantomData,
        })
    }

    /// Opens the index in `path` if it has a snapshot, otherwise creates one.
    pub async fn open_or_create(path: impl AsRef<Path>, options: IndexOptions) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path.join(DIRECTORY_FILE)).await? {
            Self::open(path, options).await
        } else {
            Self::create(path, options).await
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn global_depth(&self) -> u32 {
        self.directory.global_depth()
    }

    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.directory.bucket_count()
    }

    /// Records per primary block.
    pub fn block_factor(&self) -> usize {
        block_factor(self.cluster_size, T::BYTE_SIZE)
    }

    /// Records per overflow block.
    pub fn overflow_block_factor(&self) -> usize {
        block_factor(self.cluster_size * OVERFLOW_CLUSTER_MULTIPLIER, T::BYTE_SIZE)
    }

    pub fn primary_file(&self) -> &BlockFile {
        &self.primary
    }

    pub fn overflow_file(&self) -> &BlockFile {
        &self.overflow
    }

    /// Number of live overflow blocks across all buckets.
    pub fn overflow_block_count(&self) -> usize {
        self.directory
            .buckets()
            .map(|(_, bucket)| bucket.overflow().len())
            .sum()
    }

    /// Number of stored records, from the in-memory directory.
    pub fn len(&self) -> usize {
        self.directory
            .buckets()
            .map(|(_, bucket)| bucket.record_count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index_of(&self, record: &T, bits: u32) -> usize {
        directory_index(record.hash_code(), bits, self.max_depth)
    }

    fn bucket_of(&self, record: &T) -> BucketId {
        self.directory
            .bucket_at(self.index_of(record, self.directory.global_depth()))
    }

    /// The file holding the block at `position` of a bucket chain.
    fn file_for(&mut self, position: usize) -> &mut BlockFile {
        if position == 0 {
            &mut self.primary
        } else {
            &mut self.overflow
        }
    }

    async fn load(&mut self, position: usize, meta: &BlockMetaData) -> Result<Block<T>> {
        if !meta.is_valid {
            return Ok(Block::new());
        }
        self.file_for(position).get_block(meta.address).await
    }

    pub async fn find(&mut self, record: &T) -> Result<Option<T>> {
        let id = self.bucket_of(record);
        let chain = self.directory.bucket(id)?.chain().to_vec();
        for (position, meta) in chain.iter().enumerate() {
            if meta.valid_count == 0 {
                continue;
            }
            let block = self.load(position, meta).await?;
            if let Some(found) = block.find(record) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    pub async fn contains(&mut self, record: &T) -> Result<bool> {
        Ok(self.find(record).await?.is_some())
    }

    /// Inserts a record whose key is not stored yet.
    ///
    /// A full bucket is split, doubling the directory first when the bucket
    /// already uses every directory bit. At the depth ceiling the record goes
    /// to the bucket's overflow chain instead.
    pub async fn insert(&mut self, record: T) -> Result<()> {
        if self.contains(&record).await? {
            return Err(Error::Duplicate);
        }

        let mut split: Option<(BucketId, Block<T>)> = None;
        loop {
            let id = self.bucket_of(&record);
            let meta = *self.directory.bucket(id)?.primary();
            let mut block = match split.take() {
                Some((split_id, block)) if split_id == id => block,
                _ => self.load(0, &meta).await?,
            };

            if block.len() >= self.block_factor() {
                if meta.local_depth == self.directory.global_depth() {
                    if self.directory.global_depth() >= self.max_depth {
                        return self.append_overflow(id, record).await;
                    }
                    self.directory.double();
                    debug!(
                        global_depth = self.directory.global_depth(),
                        "doubled directory"
                    );
                }
                split = Some(self.split(id, block, &record).await?);
                continue;
            }

            block.add(record);
            let address = if meta.is_valid {
                self.primary.update_block(&block, meta.address).await?;
                meta.address
            } else {
                self.primary.add_block(&block).await?
            };
            *self.directory.bucket_mut(id)?.primary_mut() =
                BlockMetaData::allocated(address, block.len(), meta.local_depth);
            return Ok(());
        }
    }

    /// Splits the full primary block of bucket `id` on the next hash bit.
    ///
    /// The lower half of the bucket's cells keeps the bucket and its address,
    /// the upper half gets a new bucket. When every record lands on one side
    /// that side keeps the original block and the other stays unallocated.
    /// Returns the bucket `record` now routes to, with its block.
    async fn split(
        &mut self,
        id: BucketId,
        block: Block<T>,
        record: &T,
    ) -> Result<(BucketId, Block<T>)> {
        let global_depth = self.directory.global_depth();
        let meta = *self.directory.bucket(id)?.primary();
        let depth = meta.local_depth + 1;
        let index = self.index_of(record, global_depth);
        let cells = self.directory.range_of(index, meta.local_depth);
        let middle = cells.start + cells.len() / 2;

        let (lower, upper): (Vec<T>, Vec<T>) = block
            .into_records()
            .into_iter()
            .partition(|r| self.index_of(r, depth) & 1 == 0);
        let lower = Block::from_records(lower);
        let upper = Block::from_records(upper);

        let (lower_meta, upper_meta) = match (lower.is_empty(), upper.is_empty()) {
            (false, false) => {
                self.primary.update_block(&lower, meta.address).await?;
                let address = self.primary.add_block(&upper).await?;
                (
                    BlockMetaData::allocated(meta.address, lower.len(), depth),
                    BlockMetaData::allocated(address, upper.len(), depth),
                )
            }
            (true, false) => (
                BlockMetaData::unallocated(depth),
                BlockMetaData::allocated(meta.address, upper.len(), depth),
            ),
            (false, true) => (
                BlockMetaData::allocated(meta.address, lower.len(), depth),
                BlockMetaData::unallocated(depth),
            ),
            (true, true) => (
                BlockMetaData::unallocated(depth),
                BlockMetaData::unallocated(depth),
            ),
        };

        *self.directory.bucket_mut(id)?.primary_mut() = lower_meta;
        let upper_id = self
            .directory
            .add_bucket(Bucket::new(upper_meta), middle..cells.end);
        debug!(
            bucket = id,
            new_bucket = upper_id,
            local_depth = depth,
            lower = lower.len(),
            upper = upper.len(),
            "split bucket"
        );

        if index < middle {
            Ok((id, lower))
        } else {
            Ok((upper_id, upper))
        }
    }

    /// Adds `record` to the first overflow block of bucket `id` with room,
    /// or to a new overflow block at the end of the chain.
    async fn append_overflow(&mut self, id: BucketId, record: T) -> Result<()> {
        let bucket = self.directory.bucket(id)?.clone();
        let capacity = self.overflow_block_factor();

        for (offset, meta) in bucket.overflow().iter().enumerate() {
            if meta.valid_count < capacity {
                let mut block: Block<T> = self.overflow.get_block(meta.address).await?;
                block.add(record);
                self.overflow.update_block(&block, meta.address).await?;
                self.directory.bucket_mut(id)?.overflow_mut()[offset].valid_count = block.len();
                return Ok(());
            }
        }

        let block = Block::from_records(vec![record]);
        let address = self.overflow.add_block(&block).await?;
        self.directory.bucket_mut(id)?.push_overflow(BlockMetaData::allocated(
            address,
            block.len(),
            bucket.local_depth(),
        ));
        debug!(
            bucket = id,
            address,
            chain = bucket.chain().len() + 1,
            "added overflow block"
        );
        Ok(())
    }

    /// Replaces `old` with `new`.
    ///
    /// With equal keys the record is swapped inside the block holding it.
    /// Otherwise `old` is deleted and `new` inserted, which fails up front if
    /// `new`'s key is already stored.
    pub async fn update(&mut self, old: &T, new: T) -> Result<()> {
        if *old != new {
            if self.contains(&new).await? {
                return Err(Error::Duplicate);
            }
            self.delete(old).await?;
            return self.insert(new).await;
        }

        let id = self.bucket_of(old);
        let chain = self.directory.bucket(id)?.chain().to_vec();
        for (position, meta) in chain.iter().enumerate() {
            if meta.valid_count == 0 {
                continue;
            }
            let mut block = self.load(position, meta).await?;
            if block.remove(old).is_some() {
                block.add(new);
                return self
                    .file_for(position)
                    .update_block(&block, meta.address)
                    .await;
            }
        }
        Err(Error::NotFound("record"))
    }

    /// Removes the record with `record`'s key and returns it.
    ///
    /// An emptied primary block is released. Afterwards the bucket is merged
    /// with its buddy as long as both fit one block, and the directory is
    /// halved whenever no bucket needs its full depth.
    pub async fn delete(&mut self, record: &T) -> Result<T> {
        let id = self.bucket_of(record);
        if self.directory.bucket(id)?.has_overflow() {
            return self.delete_from_chain(id, record).await;
        }

        let meta = *self.directory.bucket(id)?.primary();
        let mut block = self.load(0, &meta).await?;
        let removed = block.remove(record).ok_or(Error::NotFound("record"))?;

        let updated = if block.is_empty() {
            self.primary.remove_block(meta.address).await?;
            BlockMetaData::unallocated(meta.local_depth)
        } else {
            self.primary.update_block(&block, meta.address).await?;
            BlockMetaData::allocated(meta.address, block.len(), meta.local_depth)
        };
        *self.directory.bucket_mut(id)?.primary_mut() = updated;

        self.merge(record).await?;
        Ok(removed)
    }

    /// Merges the bucket of `record` with its buddy until that stops being
    /// possible.
    ///
    /// Buckets with overflow blocks are never merged.
    async fn merge(&mut self, record: &T) -> Result<()> {
        loop {
            let global_depth = self.directory.global_depth();
            if global_depth == 0 {
                return Ok(());
            }
            let index = self.index_of(record, global_depth);
            let id = self.directory.bucket_at(index);
            let bucket = self.directory.bucket(id)?;
            let meta = *bucket.primary();
            if bucket.has_overflow() || meta.local_depth == 0 {
                return Ok(());
            }

            let buddy_id = self
                .directory
                .bucket_at(index ^ (1 << (global_depth - meta.local_depth)));
            if buddy_id == id {
                return Err(Error::Invariant("bucket is its own buddy"));
            }
            let buddy = self.directory.bucket(buddy_id)?;
            let buddy_meta = *buddy.primary();
            if buddy.has_overflow()
                || buddy_meta.local_depth != meta.local_depth
                || meta.valid_count + buddy_meta.valid_count > self.block_factor()
            {
                return Ok(());
            }

            let mut records = self.load(0, &meta).await?.into_records();
            records.extend(self.load(0, &buddy_meta).await?.into_records());
            let merged = Block::from_records(records);
            let depth = meta.local_depth - 1;

            let merged_meta = if merged.is_empty() {
                for stale in [meta, buddy_meta] {
                    if stale.is_valid {
                        self.primary.remove_block(stale.address).await?;
                    }
                }
                BlockMetaData::unallocated(depth)
            } else {
                let (keep, stale) = if meta.is_valid {
                    (meta, buddy_meta)
                } else {
                    (buddy_meta, meta)
                };
                self.primary.update_block(&merged, keep.address).await?;
                if stale.is_valid {
                    self.primary.remove_block(stale.address).await?;
                }
                BlockMetaData::allocated(keep.address, merged.len(), depth)
            };

            *self.directory.bucket_mut(id)?.primary_mut() = merged_meta;
            self.directory.absorb(id, buddy_id)?;
            debug!(
                bucket = id,
                absorbed = buddy_id,
                local_depth = depth,
                records = merged.len(),
                "merged buckets"
            );
            if self.directory.try_compress() {
                debug!(
                    global_depth = self.directory.global_depth(),
                    "halved directory"
                );
            }
        }
    }

    /// Deletes from a bucket with overflow blocks.
    ///
    /// If the remaining records fit one block less, the chain is compacted
    /// towards the primary block and its last overflow block released.
    /// Otherwise only the block that held the record is rewritten.
    async fn delete_from_chain(&mut self, id: BucketId, record: &T) -> Result<T> {
        let chain = self.directory.bucket(id)?.chain().to_vec();
        let mut blocks = Vec::with_capacity(chain.len());
        for (position, meta) in chain.iter().enumerate() {
            blocks.push(self.load(position, meta).await?);
        }

        let holder = blocks
            .iter()
            .position(|block| block.contains(record))
            .ok_or(Error::NotFound("record"))?;
        let removed = blocks[holder]
            .remove(record)
            .ok_or(Error::NotFound("record"))?;

        let remaining: usize = blocks.iter().map(Block::len).sum();
        let shrunk_capacity =
            self.block_factor() + self.overflow_block_factor() * (chain.len() - 2);
        if remaining > shrunk_capacity {
            let meta = chain[holder];
            self.file_for(holder)
                .update_block(&blocks[holder], meta.address)
                .await?;
            self.directory.bucket_mut(id)?.chain_mut()[holder].valid_count = blocks[holder].len();
            return Ok(removed);
        }

        let (last, kept) = chain
            .split_last()
            .ok_or(Error::Invariant("bucket chain without a primary block"))?;
        let mut records = blocks.into_iter().flat_map(Block::into_records);
        let mut compacted = Vec::with_capacity(kept.len());
        for (position, meta) in kept.iter().enumerate() {
            let capacity = if position == 0 {
                self.block_factor()
            } else {
                self.overflow_block_factor()
            };
            let block = Block::from_records(records.by_ref().take(capacity).collect());
            self.file_for(position)
                .update_block(&block, meta.address)
                .await?;
            compacted.push(BlockMetaData {
                valid_count: block.len(),
                ..*meta
            });
        }
        self.overflow.remove_block(last.address).await?;
        *self.directory.bucket_mut(id)? = Bucket::from_chain(compacted)?;
        debug!(
            bucket = id,
            address = last.address,
            chain = kept.len(),
            "released overflow block"
        );
        Ok(removed)
    }

    /// Lazy walk over every record, bucket by bucket in directory order,
    /// primary block first. Blocks are read as the walk reaches them.
    pub fn records(&mut self) -> Records<'_, T> {
        let blocks = self
            .directory
            .buckets()
            .filter(|(_, bucket)| bucket.primary().is_valid)
            .flat_map(|(_, bucket)| {
                bucket
                    .chain()
                    .iter()
                    .enumerate()
                    .filter(|(_, meta)| meta.is_valid)
                    .map(|(position, meta)| (position, meta.address))
                    .collect::<Vec<_>>()
            })
            .collect();
        Records {
            storage: self,
            blocks,
            pending: Vec::new().into_iter(),
        }
    }

    /// Every record, in [`HashStorage::records`] order.
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        self.records().collect_all().await
    }

    /// Writes the directory snapshot and both headers, then closes the
    /// files.
    pub async fn close(self) -> Result<()> {
        let snapshot = self.directory.to_snapshot(SnapshotHeader {
            cluster_size: self.cluster_size,
            max_depth: self.max_depth,
        });
        tokio::fs::write(self.path.join(DIRECTORY_FILE), snapshot).await?;
        self.primary.close().await?;
        self.overflow.close().await?;
        debug!(path = %self.path.display(), "closed index");
        Ok(())
    }
}

/// Cursor returned by [`HashStorage::records`].
pub struct Records<'a, T> {
    storage: &'a mut HashStorage<T>,
    /// Chain position and address of every block still to visit.
    blocks: VecDeque<(usize, u64)>,
    pending: std::vec::IntoIter<T>,
}

impl<'a, T: Record> Records<'a, T> {
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(record) = self.pending.next() {
                return Ok(Some(record));
            }
            let Some((position, address)) = self.blocks.pop_front() else {
                return Ok(None);
            };
            let block: Block<T> = self.storage.file_for(position).get_block(address).await?;
            self.pending = block.into_records().into_iter();
        }
    }

    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut records = vec![];
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{key_with_prefix, TestRecord};
    use tempfile::{tempdir, TempDir};

    async fn small_index(max_depth: u32) -> (HashStorage<TestRecord>, TempDir) {
        let dir = tempdir().unwrap();
        let options = IndexOptions::with_cluster_size(128).max_depth(max_depth);
        let storage = HashStorage::create(dir.path(), options).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn block_factor_follows_cluster_size() {
        let (storage, _dir) = small_index(24).await;
        assert_eq!(storage.block_factor(), 10);
        assert_eq!(storage.overflow_block_factor(), 21);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_bucket_splits_only_on_the_next_insert() {
        let (mut storage, _dir) = small_index(24).await;
        for i in 0..10 {
            storage
                .insert(TestRecord::new(key_with_prefix(i % 2, 1, i), 0))
                .await
                .unwrap();
        }
        assert_eq!(storage.global_depth(), 0);
        assert_eq!(storage.primary_file().max_address(), Some(0));

        storage
            .insert(TestRecord::new(key_with_prefix(1, 1, 99), 0))
            .await
            .unwrap();
        assert_eq!(storage.global_depth(), 1);
        assert_eq!(storage.bucket_count(), 2);
        assert_eq!(storage.primary_file().max_address(), Some(128));
        assert_eq!(storage.len(), 11);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn one_sided_split_keeps_block_and_doubles_again() {
        let (mut storage, _dir) = small_index(24).await;
        // The stored keys share the top bits `01`: the first split sends them
        // all down, the second all up, and the new key lands alone in `00`.
        let mut keys: Vec<i32> = (0..10).map(|i| key_with_prefix(0b01, 2, i)).collect();
        keys.push(key_with_prefix(0b00, 2, 10));
        for key in &keys {
            storage.insert(TestRecord::new(*key, 0)).await.unwrap();
        }
        assert_eq!(storage.global_depth(), 2);
        assert_eq!(storage.directory_len(), 4);
        assert_eq!(storage.bucket_count(), 3);
        assert_eq!(storage.primary_file().block_count(), 2);
        assert_eq!(storage.primary_file().max_address(), Some(128));
        for key in &keys {
            assert!(storage.find(&TestRecord::new(*key, 0)).await.unwrap().is_some());
        }
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let (mut storage, _dir) = small_index(24).await;
        storage.insert(TestRecord::new(7, 1)).await.unwrap();
        assert!(matches!(
            storage.insert(TestRecord::new(7, 2)).await,
            Err(Error::Duplicate)
        ));
        assert_eq!(
            storage
                .find(&TestRecord::new(7, 0))
                .await
                .unwrap()
                .unwrap()
                .value,
            1
        );
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_same_key_rewrites_in_place() {
        let (mut storage, _dir) = small_index(24).await;
        for i in 0..30 {
            storage
                .insert(TestRecord::new(key_with_prefix(i % 4, 2, i), i as i64))
                .await
                .unwrap();
        }
        let key = key_with_prefix(2, 2, 6);
        let depth = storage.global_depth();
        storage
            .update(&TestRecord::new(key, 0), TestRecord::new(key, 600))
            .await
            .unwrap();
        assert_eq!(storage.global_depth(), depth);
        assert_eq!(
            storage
                .find(&TestRecord::new(key, 0))
                .await
                .unwrap()
                .unwrap()
                .value,
            600
        );

        let missing = TestRecord::new(key_with_prefix(3, 2, 999), 0);
        assert!(matches!(
            storage.update(&missing, missing.clone()).await,
            Err(Error::NotFound(_))
        ));
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_with_new_key_moves_record() {
        let (mut storage, _dir) = small_index(24).await;
        storage.insert(TestRecord::new(1, 10)).await.unwrap();
        storage.insert(TestRecord::new(2, 20)).await.unwrap();

        storage
            .update(&TestRecord::new(1, 0), TestRecord::new(3, 30))
            .await
            .unwrap();
        assert!(storage.find(&TestRecord::new(1, 0)).await.unwrap().is_none());
        assert_eq!(
            storage
                .find(&TestRecord::new(3, 0))
                .await
                .unwrap()
                .unwrap()
                .value,
            30
        );

        assert!(matches!(
            storage.update(&TestRecord::new(3, 0), TestRecord::new(2, 0)).await,
            Err(Error::Duplicate)
        ));
        assert_eq!(storage.len(), 2);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn saturated_bucket_overflows_and_compacts_back() {
        // With a depth ceiling of 1 the only directory bit is bit 0, so even
        // keys can never be told apart.
        let (mut storage, _dir) = small_index(1).await;
        let records: Vec<_> = (0..45).map(|i| TestRecord::new(2 * i, i as i64)).collect();
        for record in &records {
            storage.insert(record.clone()).await.unwrap();
        }
        // 10 in the primary block, then overflow blocks of 21.
        assert_eq!(storage.global_depth(), 1);
        assert_eq!(storage.overflow_block_count(), 2);
        assert_eq!(storage.overflow_file().max_address(), Some(256));
        for record in &records {
            assert!(storage.find(record).await.unwrap().is_some());
        }

        // 44 records need 10 + 21 + 21: nothing to release yet.
        storage.delete(&records[0]).await.unwrap();
        assert_eq!(storage.overflow_block_count(), 2);

        // 30 records fit 10 + 21.
        for record in &records[1..15] {
            storage.delete(record).await.unwrap();
        }
        assert_eq!(storage.overflow_block_count(), 1);
        assert_eq!(storage.overflow_file().max_address(), Some(0));

        let mut remaining = storage.to_vec().await.unwrap();
        remaining.sort_by_key(|r| r.key);
        assert_eq!(remaining, records[15..].to_vec());

        for record in &records[15..] {
            storage.delete(record).await.unwrap();
        }
        assert!(storage.is_empty());
        assert_eq!(storage.overflow_file().max_address(), None);
        assert_eq!(storage.primary_file().max_address(), None);
        assert_eq!(storage.global_depth(), 0);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_missing_record_is_not_found() {
        let (mut storage, _dir) = small_index(24).await;
        assert!(matches!(
            storage.delete(&TestRecord::new(1, 0)).await,
            Err(Error::NotFound(_))
        ));
        storage.insert(TestRecord::new(1, 0)).await.unwrap();
        assert!(matches!(
            storage.delete(&TestRecord::new(2, 0)).await,
            Err(Error::NotFound(_))
        ));
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn records_skip_shared_cells_and_restart() {
        let (mut storage, _dir) = small_index(24).await;
        for i in 0..25 {
            storage
                .insert(TestRecord::new(key_with_prefix(i % 3, 2, i), 0))
                .await
                .unwrap();
        }
        let first = storage.to_vec().await.unwrap();
        let second = storage.to_vec().await.unwrap();
        assert_eq!(first.len(), 25);
        assert_eq!(first, second);

        let mut cursor = storage.records();
        let mut seen = 0;
        while cursor.next().await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 25);
        storage.close().await.unwrap();
    }
}
