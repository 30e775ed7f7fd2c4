use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::traits::FileSource;

/// In-memory file source, used by tests and small demo payloads
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[async_trait]
impl FileSource for MemorySource {
    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let start = offset.min(self.bytes.len() as u64) as usize;
        let end = (start + len).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }
}

/// Disk-backed file source; opens the file per read and seeks to the range
pub struct DiskSource {
    path: PathBuf,
}

impl DiskSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FileSource for DiskSource {
    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buffer = vec![0u8; len];
        let mut read = 0;
        while read < len {
            let n = file.read(&mut buffer[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buffer.truncate(read);
        Ok(buffer)
    }
}
