//! Drives one file through fingerprinting, the existence check, parallel
//! chunk transfer and the merge.

use crate::error::{ClientError, ClientResult};
use crate::fingerprint::fingerprint_file;
use crate::source::ChunkSource;
use crate::transport::Transport;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use splice_core::config::ClientConfig;
use splice_core::{
    Artifact, ArtifactName, ChunkPlan, ExistsOutcome, FileFingerprint, SessionDeclaration,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of a successful upload.
#[derive(Clone, Debug)]
pub struct UploadReport {
    pub fingerprint: FileFingerprint,
    pub artifact: Artifact,
    pub locator: String,
    pub chunk_count: u32,
    /// Chunks sent in this run; zero for an instant upload.
    pub chunks_sent: usize,
    /// True when the name was already published and nothing was transferred.
    pub instant: bool,
}

/// Server-side state of a file, without transferring anything.
#[derive(Clone, Debug)]
pub enum UploadStatus {
    Published {
        fingerprint: FileFingerprint,
        locator: String,
        artifact: Artifact,
    },
    Pending {
        fingerprint: FileFingerprint,
        chunk_count: u32,
        missing: Vec<u32>,
    },
}

/// Uploads files over a [`Transport`].
///
/// Missing chunks are read lazily and sent with at most `max_parallel`
/// requests in flight. Transient failures are retried with exponential
/// backoff; permanent ones are not. Once the cancellation token fires no new
/// transfer starts and the merge is never requested, leaving staged chunks on
/// the server for a later resume.
pub struct UploadCoordinator<T> {
    transport: T,
    config: ClientConfig,
    token: CancellationToken,
}

impl<T: Transport> UploadCoordinator<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Plan and fingerprint `path` with the configured chunk size.
    pub async fn fingerprint(&self, path: &Path) -> ClientResult<(ChunkPlan, FileFingerprint)> {
        let hashing = fingerprint_file(path, self.config.chunk_size, |index, of| {
            debug!(index, of, "hashed chunk");
        });
        tokio::select! {
            biased;
            // Dropping the hashing future drops the receiver, which stops the worker.
            _ = self.token.cancelled() => Err(ClientError::Cancelled { missing: Vec::new() }),
            result = hashing => result,
        }
    }

    /// Upload `path` and publish it as `name`.
    #[instrument(skip(self), fields(path = %path.display(), name = %name))]
    pub async fn upload(&self, path: &Path, name: &ArtifactName) -> ClientResult<UploadReport> {
        let (plan, fingerprint) = self.fingerprint(path).await?;
        let declaration = SessionDeclaration::from(plan);
        info!(%fingerprint, chunks = plan.chunk_count(), "fingerprint computed");

        let persisted = match self
            .with_retry("exists", || {
                self.transport
                    .check_exists(name, &fingerprint, Some(declaration))
            })
            .await?
        {
            ExistsOutcome::Published { locator, artifact } => {
                info!(%locator, "already published, nothing to transfer");
                return Ok(UploadReport {
                    fingerprint,
                    artifact,
                    locator,
                    chunk_count: plan.chunk_count(),
                    chunks_sent: 0,
                    instant: true,
                });
            }
            ExistsOutcome::Staged { persisted } => persisted,
        };

        let missing = plan.missing(&persisted);
        info!(
            staged = persisted.len(),
            missing = missing.len(),
            "resuming upload"
        );
        let source = ChunkSource::new(path, plan);
        let chunks_sent = self
            .transfer(&fingerprint, declaration, &source, missing)
            .await?;

        if self.token.is_cancelled() {
            return Err(ClientError::Cancelled {
                missing: Vec::new(),
            });
        }

        let merged = self
            .with_retry("merge", || self.transport.merge(&fingerprint, name))
            .await?;
        info!(locator = %merged.locator, chunks_sent, "upload complete");
        Ok(UploadReport {
            fingerprint,
            artifact: merged.artifact,
            locator: merged.locator,
            chunk_count: plan.chunk_count(),
            chunks_sent,
            instant: false,
        })
    }

    /// Report whether `name` is published and which chunks are still missing.
    ///
    /// The check declares the session with the configured chunk size, exactly
    /// as [`UploadCoordinator::upload`] would. Staged indices therefore always
    /// refer to the local plan, and chunks staged under another chunk size
    /// surface as a [`ClientError::Rejected`] conflict instead of a misleading
    /// missing list. An unknown file gets an empty session that the server's
    /// sweeper reclaims if no upload follows.
    pub async fn status(&self, path: &Path, name: &ArtifactName) -> ClientResult<UploadStatus> {
        let (plan, fingerprint) = self.fingerprint(path).await?;
        let declaration = SessionDeclaration::from(plan);
        let outcome = self
            .with_retry("exists", || {
                self.transport
                    .check_exists(name, &fingerprint, Some(declaration))
            })
            .await?;
        Ok(match outcome {
            ExistsOutcome::Published { locator, artifact } => UploadStatus::Published {
                fingerprint,
                locator,
                artifact,
            },
            ExistsOutcome::Staged { persisted } => UploadStatus::Pending {
                fingerprint,
                chunk_count: plan.chunk_count(),
                missing: plan.missing(&persisted),
            },
        })
    }

    /// Drop the server-side staging of `path`. Returns whether anything was staged.
    pub async fn cancel(&self, path: &Path) -> ClientResult<(FileFingerprint, bool)> {
        let (_, fingerprint) = self.fingerprint(path).await?;
        let response = self
            .with_retry("cancel", || self.transport.cancel(&fingerprint))
            .await?;
        Ok((fingerprint, response.removed))
    }

    /// Send every index in `missing`, returning how many were sent.
    ///
    /// On failure or cancellation, transfers already in flight are allowed to
    /// finish so the reported missing set matches what the server holds.
    async fn transfer(
        &self,
        fingerprint: &FileFingerprint,
        declaration: SessionDeclaration,
        source: &ChunkSource,
        missing: Vec<u32>,
    ) -> ClientResult<usize> {
        let parallel = self.config.max_parallel.max(1);
        let mut pending = missing.iter().copied();
        let mut confirmed = BTreeSet::new();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<ClientError> = None;

        loop {
            while failure.is_none() && !self.token.is_cancelled() && in_flight.len() < parallel {
                let Some(index) = pending.next() else { break };
                in_flight.push(async move {
                    let result = self
                        .with_retry("chunk", move || async move {
                            let data = source.read(index).await?;
                            self.transport
                                .put_chunk(fingerprint, index, declaration, data)
                                .await
                        })
                        .await;
                    (index, result)
                });
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(ack) => {
                    debug!(index, stored = ack.stored, "chunk confirmed");
                    confirmed.insert(index);
                }
                Err(e) => {
                    warn!(index, error = %e, "chunk transfer failed");
                    failure.get_or_insert(e);
                }
            }
        }

        let still_missing: Vec<u32> = missing
            .into_iter()
            .filter(|i| !confirmed.contains(i))
            .collect();
        if self.token.is_cancelled() && !still_missing.is_empty() {
            info!(missing = still_missing.len(), "upload cancelled");
            return Err(ClientError::Cancelled {
                missing: still_missing,
            });
        }
        if let Some(cause) = failure {
            return Err(ClientError::TransferFailed {
                missing: still_missing,
                source: Box::new(cause),
            });
        }
        Ok(confirmed.len())
    }

    /// Retry `op` on transient errors, doubling the delay after each attempt.
    async fn with_retry<F, Fut, R>(&self, what: &str, mut op: F) -> ClientResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<R>>,
    {
        let base = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = base.saturating_mul(1 << (attempt - 1).min(16));
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.token.cancelled() => return Err(e),
                    }
                }
                other => return other,
            }
        }
    }
}
