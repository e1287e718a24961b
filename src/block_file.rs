use crate::block::Block;
use crate::block_stream::BlockStream;
use crate::bytes::{read_i32, read_i64};
use crate::consts::{BLOCK_HEADER, FILE_HEADER_FIXED, FREE_ADDRESS_LENGTH};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::tree::AvlTree;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fixed size block allocator over a [`BlockStream`].
///
/// Blocks sit at multiples of `cluster_size`. The highest live block is at
/// `max_address`; freed slots below it are kept in an AVL tree so the
/// smallest one can be reused first. Removing the top block also drops every
/// free slot directly beneath it and truncates the file.
///
/// ## Header file layout
///
/// All integers little endian:
/// - total header size: i32
/// - max address: i64, -1 when the file holds no blocks
/// - cluster size: i32
/// - free address count: i32
/// - free addresses: i64 each, in level order of the tree
///
/// The header is only written by [`BlockFile::flush`] and
/// [`BlockFile::close`]. There is no flush on drop.
#[derive(Debug)]
pub struct BlockFile {
    stream: BlockStream,
    header_path: PathBuf,
    cluster_size: usize,
    max_address: Option<u64>,
    free_addresses: AvlTree<u64>,
    released: bool,
}

impl BlockFile {
    /// Starts an empty block file, truncating whatever is at `data_path`.
    pub async fn create(
        data_path: impl AsRef<Path>,
        header_path: impl AsRef<Path>,
        cluster_size: usize,
    ) -> Result<Self> {
        if cluster_size <= BLOCK_HEADER || i32::try_from(cluster_size).is_err() {
            return Err(Error::InvalidArgument(format!(
                "cluster size {} is out of range",
                cluster_size
            )));
        }
        let stream = BlockStream::open(data_path, true).await?;
        debug!(path = %stream.path().display(), cluster_size, "created block file");
        Ok(Self {
            stream,
            header_path: header_path.as_ref().to_path_buf(),
            cluster_size,
            max_address: None,
            free_addresses: AvlTree::new(),
            released: false,
        })
    }

    /// Restores a block file from its header.
    pub async fn open(data_path: impl AsRef<Path>, header_path: impl AsRef<Path>) -> Result<Self> {
        let header_path = header_path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&header_path).await?;
        let (max_address, cluster_size, free_addresses) = decode_header(&bytes)?;
        let stream = BlockStream::open(data_path, false).await?;
        debug!(
            path = %stream.path().display(),
            cluster_size,
            ?max_address,
            free = free_addresses.len(),
            "opened block file"
        );
        Ok(Self {
            stream,
            header_path,
            cluster_size,
            max_address,
            free_addresses,
            released: false,
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn max_address(&self) -> Option<u64> {
        self.max_address
    }

    /// Freed slots below the high water mark, ascending.
    pub fn free_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.free_addresses.iter().copied()
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        match self.max_address {
            None => 0,
            Some(max) => (max / self.cluster_size as u64) as usize + 1 - self.free_addresses.len(),
        }
    }

    /// Current length of the data file in bytes.
    pub async fn data_len(&self) -> Result<u64> {
        self.stream.len().await
    }

    fn check_live(&self, address: u64) -> Result<()> {
        let live = self.max_address.is_some_and(|max| address <= max)
            && address % self.cluster_size as u64 == 0
            && !self.free_addresses.contains(&address);
        if live {
            Ok(())
        } else {
            Err(Error::NotFound("block address"))
        }
    }

    fn check_fits<T: Record>(&self, block: &Block<T>) -> Result<()> {
        if block.byte_size() > self.cluster_size {
            return Err(Error::InvalidArgument(format!(
                "block of {} bytes does not fit a {} byte cluster",
                block.byte_size(),
                self.cluster_size
            )));
        }
        Ok(())
    }

    pub async fn get_block<T: Record>(&mut self, address: u64) -> Result<Block<T>> {
        self.check_live(address)?;
        self.stream.read_block(address, self.cluster_size).await
    }

    /// Stores `block` in a free slot and returns its address. The smallest
    /// freed address is reused before the file grows.
    pub async fn add_block<T: Record>(&mut self, block: &Block<T>) -> Result<u64> {
        self.check_fits(block)?;
        let address = match self.max_address {
            None => 0,
            Some(max) => match self.free_addresses.min() {
                Ok(&free) => {
                    self.free_addresses.delete(&free)?;
                    free
                }
                Err(_) => max + self.cluster_size as u64,
            },
        };
        if self.max_address.map_or(true, |max| address > max) {
            self.max_address = Some(address);
        }
        self.stream.write_block(block, address).await?;
        Ok(address)
    }

    pub async fn update_block<T: Record>(&mut self, block: &Block<T>, address: u64) -> Result<()> {
        self.check_fits(block)?;
        self.check_live(address)?;
        self.stream.write_block(block, address).await
    }

    pub async fn remove_block(&mut self, address: u64) -> Result<()> {
        self.check_live(address)?;
        if Some(address) != self.max_address {
            return self.free_addresses.insert(address);
        }

        let cluster = self.cluster_size as u64;
        let mut max = address.checked_sub(cluster);
        while let Some(top) = max {
            match self.free_addresses.max() {
                Ok(&free) if free == top => {
                    self.free_addresses.delete(&free)?;
                    max = top.checked_sub(cluster);
                }
                _ => break,
            }
        }
        self.max_address = max;

        let len = max.map_or(0, |max| max + cluster);
        debug!(
            path = %self.stream.path().display(),
            removed = address,
            ?max,
            "trimmed block file"
        );
        self.stream.trim(len).await
    }

    fn encode_header(&self) -> Vec<u8> {
        let total = FILE_HEADER_FIXED + self.free_addresses.len() * FREE_ADDRESS_LENGTH;
        let mut bytes = Vec::with_capacity(total);
        bytes.extend((total as i32).to_le_bytes());
        bytes.extend(self.max_address.map_or(-1, |max| max as i64).to_le_bytes());
        bytes.extend((self.cluster_size as i32).to_le_bytes());
        bytes.extend((self.free_addresses.len() as i32).to_le_bytes());
        for address in self.free_addresses.level_order() {
            bytes.extend((*address as i64).to_le_bytes());
        }
        bytes
    }

    /// Writes the header and syncs the data file.
    pub async fn flush(&mut self) -> Result<()> {
        tokio::fs::write(&self.header_path, self.encode_header()).await?;
        self.stream.flush().await
    }

    /// Persists the header and closes the file. Consumes the block file, so
    /// it can only happen once.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        self.released = true;
        debug!(path = %self.stream.path().display(), "closed block file");
        Ok(())
    }
}

impl Drop for BlockFile {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                path = %self.stream.path().display(),
                "block file dropped without close, header not persisted"
            );
        }
    }
}

fn decode_header(bytes: &[u8]) -> Result<(Option<u64>, usize, AvlTree<u64>)> {
    const WHAT: &str = "block file header";

    let total = read_i32(bytes, 0, WHAT)?;
    if total as usize != bytes.len() {
        return Err(Error::corruption(
            WHAT,
            format!("declares {} bytes but has {}", total, bytes.len()),
        ));
    }
    let max_address = match read_i64(bytes, 4, WHAT)? {
        -1 => None,
        max if max >= 0 => Some(max as u64),
        max => return Err(Error::corruption(WHAT, format!("bad max address {}", max))),
    };
    let cluster_size = read_i32(bytes, 12, WHAT)?;
    if cluster_size < 0 || cluster_size as usize <= BLOCK_HEADER {
        return Err(Error::corruption(WHAT, format!("bad cluster size {}", cluster_size)));
    }
    let count = read_i32(bytes, 16, WHAT)?;
    if count < 0 || FILE_HEADER_FIXED + count as usize * FREE_ADDRESS_LENGTH != bytes.len() {
        return Err(Error::corruption(WHAT, format!("bad free address count {}", count)));
    }

    let mut free_addresses = AvlTree::new();
    for i in 0..count as usize {
        let address = read_i64(bytes, FILE_HEADER_FIXED + i * FREE_ADDRESS_LENGTH, WHAT)?;
        let below_max = max_address.is_some_and(|max| address >= 0 && (address as u64) < max);
        if !below_max {
            return Err(Error::corruption(
                WHAT,
                format!("free address {} out of range", address),
            ));
        }
        free_addresses
            .insert(address as u64)
            .map_err(|_| Error::corruption(WHAT, format!("free address {} repeated", address)))?;
    }
    Ok((max_address, cluster_size as usize, free_addresses))
}
