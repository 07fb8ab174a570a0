use bytes::Bytes;
use sha2::{Digest, Sha256};
use splice_core::config::StorageConfig;
use splice_core::{Chunk, ChunkPlan, FileFingerprint, SessionDeclaration};
use splice_storage::UploadService;
use tempfile::TempDir;

/// Compute SHA-256 hash of data as hex string
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Fingerprint, declaration and chunks of an in-memory file.
pub fn split_file(data: &Bytes, chunk_size: u64) -> (FileFingerprint, SessionDeclaration, Vec<Chunk>) {
    let plan = ChunkPlan::new(data.len() as u64, chunk_size).unwrap();
    let chunks = plan.split(data.clone()).collect();
    (FileFingerprint::compute(data), plan.into(), chunks)
}

/// An upload service rooted in a temp dir that lives as long as the struct.
pub struct TestStore {
    pub service: UploadService,
    pub config: StorageConfig,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut StorageConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StorageConfig::under(temp_dir.path());
        tweak(&mut config);
        let service = splice_storage::from_config(&config).await.unwrap();
        Self {
            service,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Path of a staged chunk on disk.
    pub fn chunk_path(&self, fingerprint: &FileFingerprint, index: u32) -> std::path::PathBuf {
        self.config
            .staging_root
            .join(fingerprint.to_hex())
            .join(index.to_string())
    }

    /// Path of a published artifact on disk.
    pub fn artifact_path(&self, name: &str) -> std::path::PathBuf {
        self.config.publish_root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        let data = b"hello world";
        let hash = sha256_hash(data);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }
}
