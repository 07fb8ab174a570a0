//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL used to build artifact locators.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Largest chunk size a client may declare, in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Parallel chunk uploads advertised to clients.
    #[serde(default = "default_max_parallel_chunks")]
    pub max_parallel_chunks: u32,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_max_parallel_chunks() -> u32 {
    crate::DEFAULT_PARALLEL_CHUNKS
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
            max_chunk_size: default_max_chunk_size(),
            max_parallel_chunks: default_max_parallel_chunks(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("server.max_chunk_size must be greater than zero".to_string());
        }
        if self.max_parallel_chunks == 0 {
            return Err("server.max_parallel_chunks must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Staging and publish layout on the local filesystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the staging area; one directory per fingerprint.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// Root of the public namespace; one file per artifact name.
    #[serde(default = "default_publish_root")]
    pub publish_root: PathBuf,
    /// Root of the artifact metadata records.
    #[serde(default = "default_index_root")]
    pub index_root: PathBuf,
    /// Directory entries skipped when listing staged chunks.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Zero-pad chunk file names to this many digits (0 = no padding).
    #[serde(default)]
    pub index_padding: usize,
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("./data/tmp")
}

fn default_publish_root() -> PathBuf {
    PathBuf::from("./data/resources")
}

fn default_index_root() -> PathBuf {
    PathBuf::from("./data/index")
}

fn default_ignore() -> Vec<String> {
    vec![".DS_Store".to_string(), "Thumbs.db".to_string()]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            publish_root: default_publish_root(),
            index_root: default_index_root(),
            ignore: default_ignore(),
            index_padding: 0,
        }
    }
}

impl StorageConfig {
    /// Lay out all roots under one base directory.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            staging_root: base.join("tmp"),
            publish_root: base.join("resources"),
            index_root: base.join("index"),
            ..Self::default()
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let roots = [
            ("staging_root", &self.staging_root),
            ("publish_root", &self.publish_root),
            ("index_root", &self.index_root),
        ];
        for (i, (name_a, a)) in roots.iter().enumerate() {
            for (name_b, b) in roots.iter().skip(i + 1) {
                if a == b {
                    return Err(format!("storage.{name_a} and storage.{name_b} must differ"));
                }
            }
        }
        if self.index_padding > 10 {
            return Err(format!(
                "storage.index_padding {} exceeds the 10 digits of a u32 index",
                self.index_padding
            ));
        }
        Ok(())
    }
}

/// Stale staging garbage collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Run the sweeper in the background.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,
    /// Sessions untouched for this long are removed.
    #[serde(default = "default_gc_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_gc_interval_secs() -> u64 {
    3600 // 1 hour
}

fn default_gc_stale_after_secs() -> u64 {
    7 * 24 * 3600 // 1 week
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_gc_interval_secs(),
            stale_after_secs: default_gc_stale_after_secs(),
        }
    }
}

impl GcConfig {
    /// Interval between sweeps.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Age after which a session is considered abandoned.
    pub fn stale_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_after_secs)
    }

    /// Validate GC configuration.
    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::interval panics on a zero period
        if self.enabled && self.interval_secs == 0 {
            return Err("gc.interval_secs must be at least 1 when gc is enabled".to_string());
        }
        Ok(())
    }
}

/// Complete server configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage layout.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Garbage collection configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `base`.
    ///
    /// **For testing only.**
    pub fn for_testing(base: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::under(base),
            gc: GcConfig::default(),
        }
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.gc.validate()
    }
}

/// Upload client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL.
    #[serde(default = "default_client_server")]
    pub server: String,
    /// Chunk size in bytes.
    #[serde(default = "default_client_chunk_size")]
    pub chunk_size: u64,
    /// Concurrent chunk transfers.
    #[serde(default = "default_client_max_parallel")]
    pub max_parallel: usize,
    /// Retries per chunk after the first attempt, for transient failures.
    #[serde(default = "default_client_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry; doubles for every further retry.
    #[serde(default = "default_client_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_client_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_client_server() -> String {
    "http://localhost:3000".to_string()
}

fn default_client_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_client_max_parallel() -> usize {
    crate::DEFAULT_PARALLEL_CHUNKS as usize
}

fn default_client_max_retries() -> u32 {
    3
}

fn default_client_retry_base_delay_ms() -> u64 {
    1000
}

fn default_client_request_timeout_secs() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_client_server(),
            chunk_size: default_client_chunk_size(),
            max_parallel: default_client_max_parallel(),
            max_retries: default_client_max_retries(),
            retry_base_delay_ms: default_client_retry_base_delay_ms(),
            request_timeout_secs: default_client_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if self.max_parallel == 0 {
            return Err("max_parallel must be at least 1".to_string());
        }
        Ok(())
    }
}
