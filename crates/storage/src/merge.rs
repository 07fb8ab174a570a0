//! Assembly of staged chunks into a published artifact.

use crate::dedup::DedupIndex;
use crate::error::{StorageError, StorageResult};
use crate::locks::KeyedLocks;
use crate::traits::{ArtifactStore, ChunkStore, StreamingPublish};
use futures::StreamExt;
use splice_core::{Artifact, ArtifactName, ChunkPlan, FileFingerprint, FingerprintHasher};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Merges a complete chunk set into the public namespace.
///
/// One merge runs at a time per fingerprint. The artifact is assembled in a
/// private temp file while the fingerprint is recomputed, and becomes visible
/// under its name only after the digest matches. Staging is deleted only after
/// the publish succeeded, so a failed merge can simply be retried.
#[derive(Clone)]
pub struct MergeEngine {
    chunks: Arc<dyn ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
    dedup: DedupIndex,
    locks: KeyedLocks<FileFingerprint>,
}

impl MergeEngine {
    /// Create a merge engine.
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        artifacts: Arc<dyn ArtifactStore>,
        locks: KeyedLocks<FileFingerprint>,
    ) -> Self {
        let dedup = DedupIndex::new(Arc::clone(&artifacts));
        Self {
            chunks,
            artifacts,
            dedup,
            locks,
        }
    }

    /// Merge the chunks staged for `fingerprint` and publish them as `name`.
    #[instrument(skip(self), fields(fingerprint = %fingerprint, name = %name))]
    pub async fn merge(
        &self,
        fingerprint: &FileFingerprint,
        name: &ArtifactName,
    ) -> StorageResult<Artifact> {
        let _guard = self.locks.write(fingerprint).await;

        if let Some(existing) = self.dedup.exists(name).await? {
            info!("artifact already published, releasing staging");
            self.release_staging(fingerprint).await;
            return Ok(existing);
        }

        let session = self.chunks.session(fingerprint).await?;
        let (session, declaration) = match session {
            Some(session) => match session.declaration {
                Some(declaration) => (session, declaration),
                None => return Err(undeclared(fingerprint)),
            },
            None => return Err(undeclared(fingerprint)),
        };

        let plan = declaration.plan()?;
        let missing = plan.missing(&session.persisted);
        if !missing.is_empty() {
            return Err(StorageError::IncompleteUpload {
                fingerprint: *fingerprint,
                expected: Some(plan.chunk_count()),
                missing,
            });
        }

        let mut publish = self.artifacts.begin_publish(name).await?;
        let actual = match self.assemble(fingerprint, &plan, &mut *publish).await {
            Ok(actual) => actual,
            Err(e) => {
                abort(publish).await;
                return Err(e.during_merge(*fingerprint));
            }
        };

        if actual != *fingerprint {
            abort(publish).await;
            return Err(StorageError::FingerprintMismatch {
                expected: *fingerprint,
                actual,
            });
        }

        let artifact = match publish.publish(*fingerprint).await {
            Ok(artifact) => artifact,
            Err(StorageError::AlreadyPublished(_)) => {
                // A merge of another fingerprint took the name first.
                let Some(existing) = self.dedup.exists(name).await? else {
                    return Err(StorageError::AlreadyPublished(name.clone()));
                };
                info!("name published concurrently, releasing staging");
                self.release_staging(fingerprint).await;
                return Ok(existing);
            }
            Err(e) => return Err(e.during_merge(*fingerprint)),
        };
        info!(size = artifact.size_bytes, chunks = plan.chunk_count(), "merge complete");

        self.release_staging(fingerprint).await;
        Ok(artifact)
    }

    /// Stream chunks in index order into `publish`, returning the digest of
    /// everything written.
    async fn assemble(
        &self,
        fingerprint: &FileFingerprint,
        plan: &ChunkPlan,
        publish: &mut dyn StreamingPublish,
    ) -> StorageResult<FileFingerprint> {
        let mut hasher = FingerprintHasher::new();
        // Range<u32> iterates numerically; directory order is never used.
        for index in plan.indices() {
            let expected = plan.expected_len(index)?;
            let mut read = 0u64;
            let mut stream = self.chunks.get_stream(fingerprint, index).await?;
            while let Some(piece) = stream.next().await {
                let piece = piece?;
                read += piece.len() as u64;
                hasher.update(&piece);
                publish.write(piece).await?;
            }
            if read != expected {
                return Err(StorageError::ConflictingChunkSize {
                    index,
                    expected,
                    actual: read,
                });
            }
        }
        Ok(hasher.finalize())
    }

    async fn release_staging(&self, fingerprint: &FileFingerprint) {
        // The artifact is already published; a leftover namespace is only
        // garbage for the sweeper.
        if let Err(e) = self.chunks.remove(fingerprint).await {
            warn!(error = %e, "failed to remove staging after merge");
        }
    }
}

/// Nothing to merge: the chunk count is unknown, so no indices can be listed.
fn undeclared(fingerprint: &FileFingerprint) -> StorageError {
    StorageError::IncompleteUpload {
        fingerprint: *fingerprint,
        expected: None,
        missing: Vec::new(),
    }
}

async fn abort(publish: Box<dyn StreamingPublish>) {
    if let Err(e) = publish.abort().await {
        warn!(error = %e, "failed to discard partial artifact");
    }
}
