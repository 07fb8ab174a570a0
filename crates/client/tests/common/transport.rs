//! In-process transport over the storage service with fault injection.

use async_trait::async_trait;
use bytes::Bytes;
use splice_client::{ClientError, ClientResult, Transport};
use splice_core::upload::{CancelResponse, ChunkUploadResponse, MergeResponse};
use splice_core::{ArtifactName, ExistsOutcome, FileFingerprint, SessionDeclaration};
use splice_storage::{Lookup, StorageError, UploadService};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PUBLIC_BASE_URL: &str = "http://files.test";

#[derive(Default)]
struct Faults {
    transient: HashMap<u32, u32>,
    rejected: HashSet<u32>,
    cancel_after: Option<(usize, CancellationToken)>,
}

pub struct LocalTransport {
    service: UploadService,
    faults: Mutex<Faults>,
    put_attempts: Mutex<Vec<u32>>,
    stored: AtomicUsize,
    exists_calls: AtomicUsize,
    merge_calls: AtomicUsize,
    put_delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a put as in flight until dropped, whichever way it returns.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn to_client_error(e: StorageError) -> ClientError {
    match e {
        StorageError::IncompleteUpload { missing, .. } => ClientError::IncompleteUpload { missing },
        StorageError::Io(_) | StorageError::MergeIo { .. } => ClientError::Transient {
            status: Some(500),
            message: e.to_string(),
        },
        other => ClientError::Rejected {
            status: 400,
            code: "rejected".to_string(),
            message: other.to_string(),
        },
    }
}

impl LocalTransport {
    pub fn new(service: UploadService) -> Self {
        Self {
            service,
            faults: Mutex::new(Faults::default()),
            put_attempts: Mutex::new(Vec::new()),
            stored: AtomicUsize::new(0),
            exists_calls: AtomicUsize::new(0),
            merge_calls: AtomicUsize::new(0),
            put_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every put for `delay` before it reaches the service, so
    /// concurrent puts overlap.
    pub fn slow_puts(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Fail the next `times` puts of `index` with a transient error.
    pub fn fail_transiently(self, index: u32, times: u32) -> Self {
        self.faults.lock().unwrap().transient.insert(index, times);
        self
    }

    /// Reject every put of `index` permanently.
    pub fn reject(self, index: u32) -> Self {
        self.faults.lock().unwrap().rejected.insert(index);
        self
    }

    /// Fire `token` once `puts` chunks have been stored.
    pub fn cancel_after(self, puts: usize, token: CancellationToken) -> Self {
        self.faults.lock().unwrap().cancel_after = Some((puts, token));
        self
    }

    pub fn put_attempts(&self) -> usize {
        self.put_attempts.lock().unwrap().len()
    }

    pub fn attempts_for(&self, index: u32) -> usize {
        self.put_attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|&&i| i == index)
            .count()
    }

    /// Most puts ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn merge_calls(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn check_exists(
        &self,
        name: &ArtifactName,
        fingerprint: &FileFingerprint,
        declaration: Option<SessionDeclaration>,
    ) -> ClientResult<ExistsOutcome> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        match self
            .service
            .check_exists(name, fingerprint, declaration)
            .await
            .map_err(to_client_error)?
        {
            Lookup::Published(artifact) => Ok(ExistsOutcome::Published {
                locator: artifact.locator(PUBLIC_BASE_URL),
                artifact,
            }),
            Lookup::Staged { persisted, .. } => Ok(ExistsOutcome::Staged { persisted }),
        }
    }

    async fn put_chunk(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        declaration: SessionDeclaration,
        data: Bytes,
    ) -> ClientResult<ChunkUploadResponse> {
        self.put_attempts.lock().unwrap().push(index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.rejected.contains(&index) {
                return Err(ClientError::Rejected {
                    status: 400,
                    code: "conflicting_chunk_size".to_string(),
                    message: format!("chunk {index} rejected"),
                });
            }
            if let Some(remaining) = faults.transient.get_mut(&index)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(ClientError::Transient {
                    status: Some(503),
                    message: format!("chunk {index} unavailable"),
                });
            }
        }

        let outcome = self
            .service
            .put_chunk(fingerprint, index, Some(declaration), data)
            .await
            .map_err(to_client_error)?;

        let stored = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.faults.lock().unwrap().cancel_after
            && stored >= *after
        {
            token.cancel();
        }
        Ok(ChunkUploadResponse {
            index,
            stored: outcome.is_stored(),
        })
    }

    async fn merge(
        &self,
        fingerprint: &FileFingerprint,
        name: &ArtifactName,
    ) -> ClientResult<MergeResponse> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        let artifact = self
            .service
            .merge(fingerprint, name)
            .await
            .map_err(to_client_error)?;
        Ok(MergeResponse {
            locator: artifact.locator(PUBLIC_BASE_URL),
            artifact,
        })
    }

    async fn cancel(&self, fingerprint: &FileFingerprint) -> ClientResult<CancelResponse> {
        let removed = self
            .service
            .cancel(fingerprint)
            .await
            .map_err(to_client_error)?;
        Ok(CancelResponse { removed })
    }
}
