//! Application state
//!
//! Built once in `main` (or by tests) and cloned into every handler. There
//! is no global: the repository and the image store are injected here and
//! released by whoever built them.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, StorageConfig};
use crate::db::{CatalogRepository, PgCatalogRepository};
use crate::services::CatalogService;
use crate::storage::{self, ImageStore, UploadLimits};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Directory served back under a URL prefix (local storage only)
#[derive(Debug, Clone)]
pub struct StaticFiles {
    pub url_prefix: String,
    pub dir: PathBuf,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub uploads: UploadLimits,
    pub static_files: Option<StaticFiles>,
    /// `local` or `s3`, for health output
    pub storage_backend: &'static str,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn CatalogRepository>,
        store: Arc<dyn ImageStore>,
        uploads: UploadLimits,
    ) -> Self {
        Self {
            storage_backend: store.backend(),
            catalog: CatalogService::new(repo, store),
            uploads,
            static_files: None,
        }
    }

    pub fn with_static_files(mut self, url_prefix: impl Into<String>, dir: PathBuf) -> Self {
        self.static_files = Some(StaticFiles {
            url_prefix: url_prefix.into(),
            dir,
        });
        self
    }

    /// Connect to PostgreSQL (running migrations) and build the image store
    pub async fn from_config(config: &Config) -> Result<Self, BoxError> {
        let repo =
            PgCatalogRepository::connect(&config.database_url, config.database_max_connections)
                .await?;
        let store = storage::from_config(&config.storage).await?;

        let uploads = UploadLimits {
            max_files: config.max_files_per_request,
            max_file_size: config.max_file_size_bytes,
        };

        let state = Self::new(Arc::new(repo), store, uploads);
        Ok(match &config.storage {
            StorageConfig::Local {
                upload_dir,
                url_prefix,
            } => state.with_static_files(url_prefix.clone(), upload_dir.clone()),
            StorageConfig::S3 { .. } => state,
        })
    }

    /// Release database connections
    pub async fn close(&self) {
        self.catalog.repository().close().await;
    }
}
