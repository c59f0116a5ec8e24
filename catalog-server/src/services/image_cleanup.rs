//! Image Cleanup Service
//!
//! Keeps storage and the image table in step: uploads are staged before the
//! database transaction that links them, staged files are discarded when that
//! transaction fails, and files of deleted rows are removed afterwards. All
//! removal here is best-effort; failures are logged and reported, never
//! retried.

use std::sync::Arc;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{FileCleanupReport, MAX_IMAGE_URL_LEN};

use crate::storage::{DeleteOutcome, ImageStore, UploadedImage};

#[derive(Clone)]
pub struct ImageCleanupService {
    store: Arc<dyn ImageStore>,
}

impl ImageCleanupService {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }

    /// Write every upload to storage, in order
    ///
    /// If any write fails the files already written are discarded before the
    /// error is returned, so a failed stage leaves nothing behind.
    pub async fn stage(&self, images: &[UploadedImage]) -> AppResult<Vec<String>> {
        let mut staged = Vec::with_capacity(images.len());

        for image in images {
            match self.store.store(image).await {
                Ok(reference) if reference.len() > MAX_IMAGE_URL_LEN => {
                    tracing::error!(
                        reference = %reference,
                        max = MAX_IMAGE_URL_LEN,
                        "Image reference too long for the image table, discarding staged files"
                    );
                    staged.push(reference);
                    self.discard_staged(&staged).await;
                    return Err(AppError::with_message(
                        ErrorCode::FileStorageFailed,
                        format!("Stored image reference exceeds {MAX_IMAGE_URL_LEN} characters"),
                    ));
                }
                Ok(reference) => staged.push(reference),
                Err(e) => {
                    tracing::warn!(
                        file = %image.original_name,
                        backend = self.store.backend(),
                        staged = staged.len(),
                        error = %e,
                        "Image staging failed, discarding staged files"
                    );
                    self.discard_staged(&staged).await;
                    return Err(e.into());
                }
            }
        }

        Ok(staged)
    }

    /// Remove staged files that never got an image row
    ///
    /// Returns how many were removed.
    pub async fn discard_staged(&self, references: &[String]) -> usize {
        if references.is_empty() {
            return 0;
        }

        let report = self.remove_files(references).await;
        if !report.is_clean() {
            tracing::error!(
                orphans = ?report.failed,
                "Staged images could not be discarded and are now orphaned"
            );
        }
        report.removed + report.missing
    }

    /// Delete the files behind image rows that are already gone
    ///
    /// A file that no longer exists counts as cleaned up.
    pub async fn remove_files(&self, references: &[String]) -> FileCleanupReport {
        let mut report = FileCleanupReport::default();

        for reference in references {
            match self.store.delete(reference).await {
                Ok(DeleteOutcome::Deleted) => report.removed += 1,
                Ok(DeleteOutcome::NotFound) => {
                    tracing::debug!(reference = %reference, "Image file already gone");
                    report.missing += 1;
                }
                Err(e) => {
                    tracing::warn!(reference = %reference, error = %e, "Failed to delete image file");
                    report.failed.push(reference.clone());
                }
            }
        }

        if report.removed > 0 {
            tracing::info!(count = report.removed, "Image files cleaned up");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ImageKind, LocalImageStore};
    use axum::body::Bytes;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 9, 9];

    fn png(name: &str) -> UploadedImage {
        UploadedImage {
            original_name: name.to_string(),
            kind: ImageKind::Png,
            data: Bytes::from_static(PNG),
        }
    }

    async fn service(dir: &std::path::Path) -> ImageCleanupService {
        service_with_prefix(dir, "/uploads").await
    }

    async fn service_with_prefix(dir: &std::path::Path, prefix: &str) -> ImageCleanupService {
        let store = LocalImageStore::new(dir.to_path_buf(), prefix.to_string())
            .await
            .unwrap();
        ImageCleanupService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_stage_then_discard() {
        let dir = tempfile::tempdir().unwrap();
        let cleanup = service(dir.path()).await;

        let staged = cleanup.stage(&[png("a.png"), png("b.png")]).await.unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        assert_eq!(cleanup.discard_staged(&staged).await, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_files_reports_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let cleanup = service(dir.path()).await;

        let staged = cleanup.stage(&[png("a.png")]).await.unwrap();
        let report = cleanup
            .remove_files(&[
                staged[0].clone(),
                "/uploads/1700000000000-abcdefabcdef-gone.png".to_string(),
                "/elsewhere/x.png".to_string(),
            ])
            .await;

        assert_eq!(report.removed, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, vec!["/elsewhere/x.png".to_string()]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_stage_rejects_reference_longer_than_column() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("/{}", "p".repeat(MAX_IMAGE_URL_LEN));
        let cleanup = service_with_prefix(dir.path(), &prefix).await;

        let err = cleanup.stage(&[png("a.png"), png("b.png")]).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::FileStorageFailed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
