//! Filesystem public namespace.
//!
//! Artifacts live at `<publish_root>/<name>`. A JSON record at
//! `<index_root>/<name>.json` keeps the fingerprint and publish time, since the
//! public file itself carries neither.

use super::{child_path, file_stream, not_found_as, temp_sibling, write_atomic};
use crate::error::{StorageError, StorageResult};
use crate::traits::{ArtifactStore, ByteStream, StreamingPublish};
use async_trait::async_trait;
use bytes::Bytes;
use splice_core::{Artifact, ArtifactName, FileFingerprint};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Public namespace on the local filesystem.
pub struct FilesystemArtifactStore {
    publish_root: PathBuf,
    index_root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Create the store, creating both roots if needed.
    pub async fn new(
        publish_root: impl AsRef<Path>,
        index_root: impl AsRef<Path>,
    ) -> StorageResult<Self> {
        let publish_root = publish_root.as_ref().to_path_buf();
        let index_root = index_root.as_ref().to_path_buf();
        fs::create_dir_all(&publish_root).await?;
        fs::create_dir_all(&index_root).await?;
        Ok(Self {
            publish_root,
            index_root,
        })
    }

    /// Directory the artifacts are served from.
    pub fn publish_root(&self) -> &Path {
        &self.publish_root
    }

    async fn record_path(&self, name: &ArtifactName) -> StorageResult<PathBuf> {
        child_path(&self.index_root, &format!("{name}.json")).await
    }

    async fn read_record(&self, name: &ArtifactName) -> StorageResult<Option<Artifact>> {
        let path = self.record_path(name).await?;
        match fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable artifact record");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, name: &ArtifactName) -> StorageResult<Option<Artifact>> {
        let path = child_path(&self.publish_root, name.as_str()).await?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Some(record) = self.read_record(name).await?
            && record.size_bytes == metadata.len()
        {
            return Ok(Some(record));
        }

        // Placed by hand, or the record is stale.
        Ok(Some(Artifact {
            name: name.clone(),
            fingerprint: None,
            size_bytes: metadata.len(),
            published_at: metadata.modified().ok().map(OffsetDateTime::from),
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, name: &ArtifactName) -> StorageResult<ByteStream> {
        let path = child_path(&self.publish_root, name.as_str()).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(not_found_as(name.as_str()))?;
        Ok(file_stream(file))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn begin_publish(&self, name: &ArtifactName) -> StorageResult<Box<dyn StreamingPublish>> {
        let final_path = child_path(&self.publish_root, name.as_str()).await?;
        let record_path = self.record_path(name).await?;
        let temp_path = temp_sibling(&final_path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemPublish {
            name: name.clone(),
            file: Some(file),
            temp_path,
            final_path,
            record_path,
            bytes_written: 0,
            finished: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

/// In-progress publish into a private temp file.
struct FilesystemPublish {
    name: ArtifactName,
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    record_path: PathBuf,
    bytes_written: u64,
    finished: bool,
}

impl Drop for FilesystemPublish {
    fn drop(&mut self) {
        if !self.finished {
            // Cancelled mid-write; the temp file must not outlive us.
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

#[async_trait]
impl StreamingPublish for FilesystemPublish {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(std::io::Error::other("publish already closed").into());
        };
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn publish(mut self: Box<Self>, fingerprint: FileFingerprint) -> StorageResult<Artifact> {
        if let Some(file) = self.file.take() {
            file.sync_all().await?;
        }

        // A hard link fails instead of replacing an artifact another session
        // published under the same name in the meantime.
        let linked = fs::hard_link(&self.temp_path, &self.final_path).await;
        let _ = fs::remove_file(&self.temp_path).await;
        self.finished = true;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(name = %self.name, "name taken by a concurrent publish");
                return Err(StorageError::AlreadyPublished(self.name.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let artifact = Artifact {
            name: self.name.clone(),
            fingerprint: Some(fingerprint),
            size_bytes: self.bytes_written,
            published_at: Some(OffsetDateTime::now_utc()),
        };
        // The artifact is already visible; without a record head() still
        // serves it, just without the fingerprint.
        match serde_json::to_vec_pretty(&artifact) {
            Ok(record) => {
                if let Err(e) = write_atomic(&self.record_path, Bytes::from(record)).await {
                    warn!(name = %self.name, error = %e, "failed to write artifact record");
                }
            }
            Err(e) => warn!(name = %self.name, error = %e, "failed to encode artifact record"),
        }
        debug!(name = %self.name, size = self.bytes_written, "artifact published");
        Ok(artifact)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        drop(self.file.take());
        let _ = fs::remove_file(&self.temp_path).await;
        self.finished = true;
        Ok(())
    }
}
