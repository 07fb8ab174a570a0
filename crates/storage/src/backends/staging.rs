//! Filesystem staging area.
//!
//! Layout: `<root>/<fingerprint-hex>/<index>` for chunks plus
//! `<root>/<fingerprint-hex>/session.json` for the declaration. Chunks become
//! visible under their index only once fully written and synced.

use super::{child_path, file_stream, is_temp_name, not_found_as, write_new};
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ChunkStore, PutOutcome, SessionInfo};
use async_trait::async_trait;
use bytes::Bytes;
use splice_core::{FileFingerprint, SessionDeclaration, UploadSession};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Name of the per-session declaration record.
pub const SESSION_FILE: &str = "session.json";

/// Naming rules for entries inside a staging namespace.
#[derive(Clone, Debug, Default)]
pub struct StagingLayout {
    ignore: HashSet<String>,
    index_padding: usize,
}

impl StagingLayout {
    /// Create a layout.
    pub fn new(ignore: impl IntoIterator<Item = String>, index_padding: usize) -> Self {
        Self {
            ignore: ignore.into_iter().collect(),
            index_padding,
        }
    }

    /// File name for a chunk index.
    pub fn chunk_file_name(&self, index: u32) -> String {
        format!("{index:0width$}", width = self.index_padding)
    }

    /// Parse a directory entry back to an index.
    ///
    /// Only the exact name [`Self::chunk_file_name`] would produce is
    /// accepted, so `"007"` is not index 7 unless padding is 3.
    pub fn parse_index(&self, name: &str) -> Option<u32> {
        if self.ignore.contains(name) || name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let index: u32 = name.parse().ok()?;
        (self.chunk_file_name(index) == name).then_some(index)
    }
}

/// Staging area on the local filesystem.
pub struct FilesystemChunkStore {
    root: PathBuf,
    layout: StagingLayout,
}

impl FilesystemChunkStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(root: impl AsRef<Path>, layout: StagingLayout) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, layout })
    }

    /// Root directory of the staging area.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn session_dir(&self, fingerprint: &FileFingerprint) -> StorageResult<PathBuf> {
        child_path(&self.root, &fingerprint.to_hex()).await
    }

    async fn read_declaration(&self, dir: &Path) -> StorageResult<Option<SessionDeclaration>> {
        let path = dir.join(SESSION_FILE);
        match fs::read(&path).await {
            Ok(raw) => {
                let declaration = serde_json::from_slice(&raw).map_err(|e| {
                    splice_core::Error::Serialization(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(declaration))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan_indices(&self, dir: &Path) -> StorageResult<BTreeSet<u32>> {
        let mut indices = BTreeSet::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(indices),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == SESSION_FILE || is_temp_name(&name) {
                continue;
            }
            match self.layout.parse_index(&name) {
                Some(index) => {
                    indices.insert(index);
                }
                None => debug!(entry = %name, "skipping non-chunk entry in staging"),
            }
        }
        Ok(indices)
    }
}

#[async_trait]
impl ChunkStore for FilesystemChunkStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn declare(
        &self,
        fingerprint: &FileFingerprint,
        declaration: SessionDeclaration,
    ) -> StorageResult<SessionDeclaration> {
        declaration.plan()?;
        let dir = self.session_dir(fingerprint).await?;
        fs::create_dir_all(&dir).await?;

        let record = serde_json::to_vec(&declaration)
            .map_err(|e| splice_core::Error::Serialization(e.to_string()))?;
        if write_new(&dir.join(SESSION_FILE), &record).await? {
            debug!("session declared");
            return Ok(declaration);
        }

        let existing = self
            .read_declaration(&dir)
            .await?
            .ok_or_else(|| StorageError::UndeclaredSession(*fingerprint))?;
        if existing != declaration {
            return Err(StorageError::ConflictingSession {
                fingerprint: *fingerprint,
                existing,
                requested: declaration,
            });
        }
        Ok(existing)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn session(&self, fingerprint: &FileFingerprint) -> StorageResult<Option<UploadSession>> {
        let dir = self.session_dir(fingerprint).await?;
        if !fs::try_exists(&dir).await? {
            return Ok(None);
        }
        let declaration = self.read_declaration(&dir).await?;
        let persisted = self.scan_indices(&dir).await?;
        Ok(Some(UploadSession {
            fingerprint: *fingerprint,
            declaration,
            persisted,
        }))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        data: Bytes,
    ) -> StorageResult<PutOutcome> {
        let dir = self.session_dir(fingerprint).await?;
        let declaration = self
            .read_declaration(&dir)
            .await?
            .ok_or(StorageError::UndeclaredSession(*fingerprint))?;
        let expected = declaration.plan()?.expected_len(index)?;
        let actual = data.len() as u64;
        if actual != expected {
            return Err(StorageError::ConflictingChunkSize {
                index,
                expected,
                actual,
            });
        }

        let path = child_path(&dir, &self.layout.chunk_file_name(index)).await?;
        if write_new(&path, &data).await? {
            Ok(PutOutcome::Stored)
        } else {
            debug!(index, "chunk already staged");
            Ok(PutOutcome::AlreadyPresent)
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_persisted(&self, fingerprint: &FileFingerprint) -> StorageResult<BTreeSet<u32>> {
        let dir = self.session_dir(fingerprint).await?;
        self.scan_indices(&dir).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
    ) -> StorageResult<ByteStream> {
        let dir = self.session_dir(fingerprint).await?;
        let path = child_path(&dir, &self.layout.chunk_file_name(index)).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(not_found_as(format!("{fingerprint}/{index}")))?;
        Ok(file_stream(file))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove(&self, fingerprint: &FileFingerprint) -> StorageResult<bool> {
        let dir = self.session_dir(fingerprint).await?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_sessions(&self) -> StorageResult<Vec<SessionInfo>> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Ok(fingerprint) = FileFingerprint::from_hex(&name.to_string_lossy()) else {
                warn!(entry = ?name, "unexpected directory in staging root");
                continue;
            };
            let last_modified = entry.metadata().await?.modified()?;
            sessions.push(SessionInfo {
                fingerprint,
                last_modified,
            });
        }
        Ok(sessions)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
