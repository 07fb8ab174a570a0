//! Application state shared across handlers.

use splice_core::config::AppConfig;
use splice_storage::UploadService;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<AppConfig>,
    /// Upload operations over staging and publish storage.
    pub service: UploadService,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: AppConfig, service: UploadService) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// Build state from configuration, creating the storage roots.
    pub async fn from_config(config: AppConfig) -> splice_storage::StorageResult<Self> {
        let service = splice_storage::from_config(&config.storage).await?;
        Ok(Self::new(config, service))
    }
}
