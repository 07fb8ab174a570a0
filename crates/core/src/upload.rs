//! Upload session types and the request/response shapes exchanged with the server.

use crate::artifact::{Artifact, ArtifactName};
use crate::chunk::ChunkPlan;
use crate::hash::FileFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// File size and chunk size declared by a client for one fingerprint.
///
/// Persisted alongside the staged chunks so the expected chunk count and the
/// expected length of every index survive restarts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeclaration {
    /// Total file size in bytes.
    pub file_size: u64,
    /// Nominal chunk size in bytes.
    pub chunk_size: u64,
}

impl SessionDeclaration {
    /// Create a declaration.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        Self {
            file_size,
            chunk_size,
        }
    }

    /// Validate and convert to a chunk plan.
    pub fn plan(&self) -> crate::Result<ChunkPlan> {
        ChunkPlan::new(self.file_size, self.chunk_size)
    }
}

impl From<ChunkPlan> for SessionDeclaration {
    fn from(plan: ChunkPlan) -> Self {
        Self::new(plan.file_size(), plan.chunk_size())
    }
}

/// Staging state for one fingerprint.
#[derive(Clone, Debug)]
pub struct UploadSession {
    /// Content key.
    pub fingerprint: FileFingerprint,
    /// Declaration, if one was recorded.
    pub declaration: Option<SessionDeclaration>,
    /// Indices durably staged so far.
    pub persisted: BTreeSet<u32>,
}

impl UploadSession {
    /// Declared chunk count `N`, if the session has a declaration.
    pub fn declared_chunk_count(&self) -> Option<u32> {
        self.declaration
            .and_then(|d| d.plan().ok())
            .map(|p| p.chunk_count())
    }

    /// Missing indices, or `None` when `N` is unknown.
    pub fn missing(&self) -> Option<Vec<u32>> {
        let plan = self.declaration?.plan().ok()?;
        Some(plan.missing(&self.persisted))
    }

    /// True when every declared index is staged.
    pub fn is_complete(&self) -> bool {
        self.declaration
            .and_then(|d| d.plan().ok())
            .is_some_and(|p| p.is_complete(&self.persisted))
    }
}

/// Query for `GET /v1/uploads/exists`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExistsQuery {
    /// Target artifact name.
    pub file_name: String,
    /// Content fingerprint (hex).
    pub fingerprint: String,
    /// Declared file size; when present with `chunk_size` the session is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Declared chunk size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

/// Response to an existence check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExistsResponse {
    /// Whether an artifact is already published under the requested name.
    pub exists: bool,
    /// Public locator of the artifact when `exists` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// The published artifact when `exists` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Staged chunk indices when `exists` is false, ascending.
    #[serde(default)]
    pub persisted_indices: Vec<u32>,
}

/// Existence check outcome as seen by the client.
#[derive(Clone, Debug)]
pub enum ExistsOutcome {
    /// Already published: nothing to transfer.
    Published {
        /// Public locator.
        locator: String,
        /// The artifact.
        artifact: Artifact,
    },
    /// Not published; these indices are already staged.
    Staged {
        /// Staged indices.
        persisted: BTreeSet<u32>,
    },
}

impl ExistsResponse {
    /// Build the response for a published artifact.
    pub fn published(artifact: Artifact, locator: String) -> Self {
        Self {
            exists: true,
            locator: Some(locator),
            artifact: Some(artifact),
            persisted_indices: Vec::new(),
        }
    }

    /// Build the response for an unpublished name.
    pub fn staged(persisted: &BTreeSet<u32>) -> Self {
        Self {
            exists: false,
            locator: None,
            artifact: None,
            persisted_indices: persisted.iter().copied().collect(),
        }
    }

    /// Convert into a typed outcome, rejecting inconsistent payloads.
    pub fn into_outcome(self) -> crate::Result<ExistsOutcome> {
        if self.exists {
            match (self.locator, self.artifact) {
                (Some(locator), Some(artifact)) => Ok(ExistsOutcome::Published { locator, artifact }),
                _ => Err(crate::Error::Serialization(
                    "exists response missing locator or artifact".to_string(),
                )),
            }
        } else {
            Ok(ExistsOutcome::Staged {
                persisted: self.persisted_indices.into_iter().collect(),
            })
        }
    }
}

/// Query for `PUT /v1/uploads/{fingerprint}/chunks/{index}`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChunkUploadQuery {
    /// Declared file size.
    pub file_size: u64,
    /// Declared chunk size.
    pub chunk_size: u64,
}

impl From<SessionDeclaration> for ChunkUploadQuery {
    fn from(d: SessionDeclaration) -> Self {
        Self {
            file_size: d.file_size,
            chunk_size: d.chunk_size,
        }
    }
}

/// Acknowledgment of a chunk upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    /// The chunk index.
    pub index: u32,
    /// False when the index was already staged and the write was skipped.
    pub stored: bool,
}

/// Body for `POST /v1/uploads/{fingerprint}/merge`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Target artifact name.
    pub file_name: ArtifactName,
}

/// Response to a successful merge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeResponse {
    /// Public locator of the artifact.
    pub locator: String,
    /// The published artifact.
    pub artifact: Artifact,
}

/// Response to `DELETE /v1/uploads/{fingerprint}`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    /// False when nothing was staged for the fingerprint.
    pub removed: bool,
}

/// Error body returned by the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Indices still missing, for `incomplete_upload`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u32>>,
}
