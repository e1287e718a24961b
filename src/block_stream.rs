use crate::block::Block;
use crate::error::Result;
use crate::record::Record;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::trace;

/// Positioned block I/O against one open file. Nothing is cached, every call
/// goes to the file.
#[derive(Debug)]
pub struct BlockStream {
    file: File,
    path: PathBuf,
}

impl BlockStream {
    /// Opens the file, truncating it when `fresh` is set. The file is created
    /// if it does not exist.
    pub async fn open(path: impl AsRef<Path>, fresh: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(fresh)
            .open(&path)
            .await?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the block at `address`. Up to `cluster_size` bytes are read; the
    /// last block of a file may be shorter since writes are not padded.
    pub async fn read_block<T: Record>(
        &mut self,
        address: u64,
        cluster_size: usize,
    ) -> Result<Block<T>> {
        self.file.seek(SeekFrom::Start(address)).await?;
        let mut buf = vec![0; cluster_size];
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.file.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        trace!(path = %self.path.display(), address, filled, "read block");
        Block::from_bytes(&buf[..filled])
    }

    pub async fn write_block<T: Record>(&mut self, block: &Block<T>, address: u64) -> Result<()> {
        let bytes = block.to_bytes();
        self.file.seek(SeekFrom::Start(address)).await?;
        self.file.write_all(&bytes).await?;
        trace!(path = %self.path.display(), address, len = bytes.len(), "wrote block");
        Ok(())
    }

    /// Cuts the file down to `len` bytes.
    pub async fn trim(&mut self, len: u64) -> Result<()> {
        self.file.flush().await?;
        self.file.set_len(len).await?;
        trace!(path = %self.path.display(), len, "trimmed file");
        Ok(())
    }

    pub async fn len(&self) -> Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}
