//! Image storage adapters
//!
//! An [`ImageStore`] turns a validated upload into a durable reference (a
//! URL path for local disk, an object URL for S3) and reverses that mapping
//! for deletion. The database only ever stores the reference.

mod local;
mod s3;
pub mod upload;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageConfig;

pub use local::LocalImageStore;
pub use s3::{S3ImageStore, key_from_reference};
pub use upload::{ImageKind, UploadLimits, UploadedImage};

/// Storage adapter error
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reference was not produced by this store (or tries to escape it)
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was stored under the reference
    NotFound,
}

/// Storage backend for product images
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Short backend name for logs (`local`, `s3`)
    fn backend(&self) -> &'static str;

    /// Write a new file and return its reference. Never overwrites.
    async fn store(&self, image: &UploadedImage) -> StorageResult<String>;

    /// Remove the file behind `reference`
    async fn delete(&self, reference: &str) -> StorageResult<DeleteOutcome>;

    async fn exists(&self, reference: &str) -> StorageResult<bool>;
}

/// Build the configured storage backend
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ImageStore>> {
    match config {
        StorageConfig::Local {
            upload_dir,
            url_prefix,
        } => {
            let store = LocalImageStore::new(upload_dir.clone(), url_prefix.clone()).await?;
            tracing::info!(dir = %upload_dir.display(), prefix = %url_prefix, "Using local image storage");
            Ok(Arc::new(store))
        }
        StorageConfig::S3 {
            bucket,
            key_prefix,
            public_base_url,
            endpoint_url,
        } => {
            let store = S3ImageStore::from_env(
                bucket.clone(),
                key_prefix.clone(),
                public_base_url.clone(),
                endpoint_url.as_deref(),
            )
            .await;
            tracing::info!(bucket = %bucket, prefix = %key_prefix, "Using S3 image storage");
            Ok(Arc::new(store))
        }
    }
}
