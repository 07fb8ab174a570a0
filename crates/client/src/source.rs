//! Lazy per-index chunk reads from a local file.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use splice_core::ChunkPlan;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A file partitioned by a [`ChunkPlan`]; each chunk is read only when asked for.
#[derive(Clone, Debug)]
pub struct ChunkSource {
    path: PathBuf,
    plan: ChunkPlan,
}

impl ChunkSource {
    /// Wrap `path` without opening it; the file is read per chunk.
    pub fn new(path: impl Into<PathBuf>, plan: ChunkPlan) -> Self {
        Self {
            path: path.into(),
            plan,
        }
    }

    /// The local file chunks are read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Partition the indices passed to [`ChunkSource::read`] refer to.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Read chunk `index`. A file that shrank since planning is a read error.
    pub async fn read(&self, index: u32) -> ClientResult<Bytes> {
        let range = self.plan.range(index)?;
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| ClientError::read(&self.path, e))?;
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| ClientError::read(&self.path, e))?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| ClientError::read(&self.path, e))?;
        Ok(Bytes::from(buf))
    }
}
