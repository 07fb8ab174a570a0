//! Lookup of already-published artifacts.

use crate::error::StorageResult;
use crate::traits::ArtifactStore;
use splice_core::{Artifact, ArtifactName};
use std::sync::Arc;

/// Answers whether an artifact is already published under a name.
///
/// Dedup is keyed by name: a second upload of the same name is treated as
/// already done whatever its content, and the recorded fingerprint is handed
/// back so callers can tell.
#[derive(Clone)]
pub struct DedupIndex {
    artifacts: Arc<dyn ArtifactStore>,
}

impl DedupIndex {
    /// Create an index over an artifact store.
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// The published artifact under `name`, if any.
    pub async fn exists(&self, name: &ArtifactName) -> StorageResult<Option<Artifact>> {
        self.artifacts.head(name).await
    }
}
