//! Server-side upload operations over the staging and publish stores.

use crate::dedup::DedupIndex;
use crate::error::StorageResult;
use crate::gc::{SweepStats, sweep_stale_sessions};
use crate::locks::KeyedLocks;
use crate::merge::MergeEngine;
use crate::traits::{ArtifactStore, ChunkStore, PutOutcome};
use bytes::Bytes;
use splice_core::{Artifact, ArtifactName, FileFingerprint, SessionDeclaration};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Answer to an existence check.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// An artifact is already published under the name.
    Published(Artifact),
    /// Not published; these indices are staged for the fingerprint.
    Staged {
        /// Staged indices, ascending.
        persisted: BTreeSet<u32>,
        /// Declared chunk count, when a declaration exists.
        chunk_count: Option<u32>,
    },
}

/// Entry point for every upload operation.
///
/// Chunk writes and declarations hold the fingerprint's lock shared; merge and
/// cancel hold it exclusively.
#[derive(Clone)]
pub struct UploadService {
    chunks: Arc<dyn ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
    dedup: DedupIndex,
    merger: MergeEngine,
    locks: KeyedLocks<FileFingerprint>,
}

impl UploadService {
    /// Wire a service over the given stores.
    pub fn new(chunks: Arc<dyn ChunkStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        let locks = KeyedLocks::new();
        let merger = MergeEngine::new(Arc::clone(&chunks), Arc::clone(&artifacts), locks.clone());
        Self {
            dedup: DedupIndex::new(Arc::clone(&artifacts)),
            chunks,
            artifacts,
            merger,
            locks,
        }
    }

    /// Staging store.
    pub fn chunks(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    /// Publish store.
    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Report whether `name` is published, otherwise which chunks of
    /// `fingerprint` are staged. A declaration, when given, creates the session
    /// or is checked against the recorded one.
    #[instrument(skip(self), fields(fingerprint = %fingerprint, name = %name))]
    pub async fn check_exists(
        &self,
        name: &ArtifactName,
        fingerprint: &FileFingerprint,
        declaration: Option<SessionDeclaration>,
    ) -> StorageResult<Lookup> {
        if let Some(artifact) = self.dedup.exists(name).await? {
            return Ok(Lookup::Published(artifact));
        }

        let _guard = self.locks.read(fingerprint).await;
        if let Some(declaration) = declaration {
            self.chunks.declare(fingerprint, declaration).await?;
        }
        let (persisted, chunk_count) = match self.chunks.session(fingerprint).await? {
            Some(session) => {
                let count = session.declared_chunk_count();
                (session.persisted, count)
            }
            None => (BTreeSet::new(), None),
        };
        Ok(Lookup::Staged {
            persisted,
            chunk_count,
        })
    }

    /// Stage one chunk, declaring the session first when a declaration is
    /// supplied.
    #[instrument(skip(self, data), fields(fingerprint = %fingerprint, size = data.len()))]
    pub async fn put_chunk(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        declaration: Option<SessionDeclaration>,
        data: Bytes,
    ) -> StorageResult<PutOutcome> {
        let _guard = self.locks.read(fingerprint).await;
        if let Some(declaration) = declaration {
            self.chunks.declare(fingerprint, declaration).await?;
        }
        self.chunks.put(fingerprint, index, data).await
    }

    /// Merge and publish. See [`MergeEngine::merge`].
    pub async fn merge(
        &self,
        fingerprint: &FileFingerprint,
        name: &ArtifactName,
    ) -> StorageResult<Artifact> {
        self.merger.merge(fingerprint, name).await
    }

    /// Drop every staged chunk of `fingerprint`. Returns false when nothing
    /// was staged.
    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn cancel(&self, fingerprint: &FileFingerprint) -> StorageResult<bool> {
        let _guard = self.locks.write(fingerprint).await;
        self.chunks.remove(fingerprint).await
    }

    /// Remove sessions untouched for longer than `stale_after`.
    pub async fn sweep(&self, stale_after: Duration) -> StorageResult<SweepStats> {
        sweep_stale_sessions(self.chunks.as_ref(), &self.locks, stale_after).await
    }
}
