//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use splice_core::{Artifact, ArtifactName, FileFingerprint, SessionDeclaration, UploadSession};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::SystemTime;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Result of a chunk write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The chunk was written.
    Stored,
    /// The index was already staged; nothing was written.
    AlreadyPresent,
}

impl PutOutcome {
    /// True when bytes were written.
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Summary of one staging namespace, used by garbage collection.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    /// Content key.
    pub fingerprint: FileFingerprint,
    /// Last time the namespace changed.
    pub last_modified: SystemTime,
}

/// Staging area for chunks keyed by `(fingerprint, index)`.
///
/// Implementations must be durable across restarts and must never expose a
/// partially written chunk under its index.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// Record the declaration for a fingerprint, or verify it against the one
    /// already recorded. Returns the recorded declaration.
    async fn declare(
        &self,
        fingerprint: &FileFingerprint,
        declaration: SessionDeclaration,
    ) -> StorageResult<SessionDeclaration>;

    /// Load the session for a fingerprint, `None` when nothing is staged.
    async fn session(&self, fingerprint: &FileFingerprint) -> StorageResult<Option<UploadSession>>;

    /// Stage one chunk. Writing an index that is already staged is a no-op.
    ///
    /// Fails with `UndeclaredSession` when no declaration exists, with
    /// `IndexOutOfRange` for an index past the declared count, and with
    /// `ConflictingChunkSize` when the payload length differs from the
    /// expected length of that index.
    async fn put(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        data: Bytes,
    ) -> StorageResult<PutOutcome>;

    /// Indices currently staged for a fingerprint.
    async fn list_persisted(&self, fingerprint: &FileFingerprint) -> StorageResult<BTreeSet<u32>>;

    /// Stream one staged chunk.
    async fn get_stream(&self, fingerprint: &FileFingerprint, index: u32)
    -> StorageResult<ByteStream>;

    /// Delete the whole staging namespace. Returns false when it did not exist.
    async fn remove(&self, fingerprint: &FileFingerprint) -> StorageResult<bool>;

    /// Enumerate staging namespaces.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionInfo>>;

    /// Get the name of this storage backend, for logging.
    fn backend_name(&self) -> &'static str;
}

/// Public namespace of published artifacts keyed by name.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Look up a published artifact.
    async fn head(&self, name: &ArtifactName) -> StorageResult<Option<Artifact>>;

    /// Stream a published artifact.
    async fn get_stream(&self, name: &ArtifactName) -> StorageResult<ByteStream>;

    /// Start assembling an artifact. Nothing is visible under `name` until
    /// [`StreamingPublish::publish`] returns.
    async fn begin_publish(&self, name: &ArtifactName) -> StorageResult<Box<dyn StreamingPublish>>;

    /// Get the name of this storage backend, for logging.
    fn backend_name(&self) -> &'static str;
}

/// An artifact being assembled at a private location.
#[async_trait]
pub trait StreamingPublish: Send {
    /// Append data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes written so far.
    fn bytes_written(&self) -> u64;

    /// Flush durably and make the artifact visible under its name.
    async fn publish(self: Box<Self>, fingerprint: FileFingerprint) -> StorageResult<Artifact>;

    /// Discard everything written.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
