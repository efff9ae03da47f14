use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};

/// How many bytes a single upload request may carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkSize {
    /// Send everything that remains in one request.
    #[default]
    Unbounded,
    Bytes(u64),
}

impl ChunkSize {
    pub fn validate(self) -> Result<Self> {
        match self {
            ChunkSize::Bytes(0) => Err(Error::Configuration(
                "chunk size must be greater than zero".to_string(),
            )),
            other => Ok(other),
        }
    }

    /// Length of the next chunk when `remaining` bytes are left.
    pub fn limit(self, remaining: u64) -> u64 {
        match self {
            ChunkSize::Unbounded => remaining,
            ChunkSize::Bytes(size) => size.min(remaining),
        }
    }
}

impl From<Option<u64>> for ChunkSize {
    fn from(size: Option<u64>) -> Self {
        size.map_or(ChunkSize::Unbounded, ChunkSize::Bytes)
    }
}

pub struct ChunkReader {
    path: PathBuf,
    file: File,
    total_size: u64,
    chunk_size: ChunkSize,
}

impl ChunkReader {
    pub async fn open(path: impl AsRef<Path>, chunk_size: ChunkSize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let chunk_size = chunk_size.validate()?;
        let file = File::open(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        let total_size = file
            .metadata()
            .await
            .map_err(|e| Error::io(&path, e))?
            .len();

        Ok(Self {
            path,
            file,
            total_size,
            chunk_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    /// Read the chunk starting at `offset`. Returns fewer bytes than the
    /// chunk size near the end of the file and nothing at or past it.
    pub async fn read_at(&mut self, offset: u64) -> Result<Vec<u8>> {
        if offset >= self.total_size {
            return Ok(Vec::new());
        }
        let len = self.chunk_size.limit(self.total_size - offset);
        let capacity = usize::try_from(len).map_err(|_| {
            Error::Configuration(format!("a {len} byte chunk does not fit in memory"))
        })?;

        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        let mut buffer = vec![0u8; capacity];
        self.file
            .read_exact(&mut buffer)
            .await
            .map_err(|e| Error::io(&self.path, e))?;

        Ok(buffer)
    }

    /// Stream the chunk starting at `offset` straight from disk through its
    /// own file handle. Returns the chunk length alongside the stream.
    pub async fn stream_at(&self, offset: u64) -> Result<(u64, ReaderStream<Take<File>>)> {
        let len = self.chunk_size.limit(self.total_size.saturating_sub(offset));
        let mut file = File::open(&self.path)
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::io(&self.path, e))?;

        Ok((len, ReaderStream::new(file.take(len))))
    }
}
