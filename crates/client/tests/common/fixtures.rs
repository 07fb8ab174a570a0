//! Deterministic files and a temp-dir backed upload service.

use splice_core::config::{ClientConfig, StorageConfig};
use splice_core::{ArtifactName, SessionDeclaration};
use splice_storage::{ChunkStore, UploadService};
use super::transport::LocalTransport;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Pseudo-random bytes that depend only on `len` and `seed`.
pub fn seeded_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub fn name(s: &str) -> ArtifactName {
    ArtifactName::parse(s).unwrap()
}

/// Client settings sized for tests: small chunks and millisecond backoff.
pub fn client_config(chunk_size: u64, max_parallel: usize) -> ClientConfig {
    ClientConfig {
        chunk_size,
        max_parallel,
        max_retries: 3,
        retry_base_delay_ms: 1,
        ..ClientConfig::default()
    }
}

/// A storage service rooted in a temp directory, plus a scratch area for
/// local files.
pub struct LocalServer {
    pub service: UploadService,
    pub config: StorageConfig,
    pub files: PathBuf,
    _temp: TempDir,
}

impl LocalServer {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::under(temp.path().join("server"));
        let service = splice_storage::from_config(&config).await.unwrap();
        let files = temp.path().join("local");
        std::fs::create_dir_all(&files).unwrap();
        Self {
            service,
            config,
            files,
            _temp: temp,
        }
    }

    pub fn transport(&self) -> LocalTransport {
        LocalTransport::new(self.service.clone())
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        write_file(&self.files, name, data)
    }

    pub fn published_path(&self, name: &str) -> PathBuf {
        self.config.publish_root.join(name)
    }

    /// Stage chunks of `data` directly, as an earlier interrupted run would have.
    pub async fn stage(&self, data: &[u8], chunk_size: u64, indices: &[u32]) {
        let fingerprint = splice_core::FileFingerprint::compute(data);
        let declaration = SessionDeclaration::new(data.len() as u64, chunk_size);
        let plan = declaration.plan().unwrap();
        for &index in indices {
            let range = plan.range(index).unwrap();
            let chunk = bytes::Bytes::copy_from_slice(&data[range.start as usize..range.end as usize]);
            self.service
                .put_chunk(&fingerprint, index, Some(declaration), chunk)
                .await
                .unwrap();
        }
    }

    /// Indices staged on the server for `data`.
    pub async fn staged(&self, data: &[u8]) -> Vec<u32> {
        let fingerprint = splice_core::FileFingerprint::compute(data);
        match self.service.chunks().session(&fingerprint).await.unwrap() {
            Some(session) => session.persisted.into_iter().collect(),
            None => Vec::new(),
        }
    }
}
