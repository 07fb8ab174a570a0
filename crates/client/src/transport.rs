//! The request/response seam between the coordinator and a server.

use crate::error::ClientResult;
use async_trait::async_trait;
use bytes::Bytes;
use splice_core::upload::{CancelResponse, ChunkUploadResponse, MergeResponse};
use splice_core::{ArtifactName, ExistsOutcome, FileFingerprint, SessionDeclaration};

/// Upload protocol operations.
///
/// Implementations classify failures: [`ClientError::Transient`] for anything
/// worth retrying, [`ClientError::Rejected`] or
/// [`ClientError::IncompleteUpload`] for permanent answers.
///
/// [`ClientError::Transient`]: crate::ClientError::Transient
/// [`ClientError::Rejected`]: crate::ClientError::Rejected
/// [`ClientError::IncompleteUpload`]: crate::ClientError::IncompleteUpload
#[async_trait]
pub trait Transport: Send + Sync {
    /// Is `name` published? If not, which chunks of `fingerprint` are staged?
    /// A declaration creates the session on the server.
    async fn check_exists(
        &self,
        name: &ArtifactName,
        fingerprint: &FileFingerprint,
        declaration: Option<SessionDeclaration>,
    ) -> ClientResult<ExistsOutcome>;

    /// Stage chunk `index`.
    async fn put_chunk(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        declaration: SessionDeclaration,
        data: Bytes,
    ) -> ClientResult<ChunkUploadResponse>;

    /// Merge the staged chunks and publish them as `name`.
    async fn merge(
        &self,
        fingerprint: &FileFingerprint,
        name: &ArtifactName,
    ) -> ClientResult<MergeResponse>;

    /// Drop everything staged for `fingerprint`.
    async fn cancel(&self, fingerprint: &FileFingerprint) -> ClientResult<CancelResponse>;
}
