//! Catalog Service
//!
//! Product operations with image lifecycle coordination. Storage and the
//! database are separate failure domains, so every write follows the same
//! shape: validate, stage files, commit rows in one transaction, then either
//! discard the staged files (transaction failed) or remove the files of rows
//! that were deleted (transaction succeeded). The image row is authoritative.

use std::sync::Arc;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    ImageDeleted, ProductCreate, ProductDeleted, ProductFull, ProductImage, ProductUpdate,
};

use super::ImageCleanupService;
use crate::db::{CatalogRepository, RepoError};
use crate::storage::{ImageStore, UploadedImage};

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepository>,
    cleanup: ImageCleanupService,
}

fn product_not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::ProductNotFound, format!("Product {id} not found"))
        .with_detail("product_id", id)
}

fn image_not_found(product_id: i64, image_ids: &[i64]) -> AppError {
    AppError::with_message(
        ErrorCode::ImageNotFound,
        format!("Image(s) {image_ids:?} not found for product {product_id}"),
    )
    .with_detail("product_id", product_id)
    .with_detail("image_ids", image_ids.to_vec())
}

fn sku_taken(sku: &str) -> AppError {
    AppError::with_message(
        ErrorCode::SkuAlreadyExists,
        format!("A product with SKU {sku} already exists"),
    )
    .with_detail("sku", sku)
}

fn image_urls(images: &[ProductImage]) -> Vec<String> {
    images.iter().map(|img| img.url.clone()).collect()
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepository>, store: Arc<dyn ImageStore>) -> Self {
        Self {
            repo,
            cleanup: ImageCleanupService::new(store),
        }
    }

    pub fn repository(&self) -> &Arc<dyn CatalogRepository> {
        &self.repo
    }

    pub async fn list_products(&self) -> AppResult<Vec<ProductFull>> {
        Ok(self.repo.list_products().await?)
    }

    pub async fn get_product(&self, id: i64) -> AppResult<ProductFull> {
        self.repo
            .find_product(id)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    pub async fn list_images(&self, product_id: i64) -> AppResult<Vec<ProductImage>> {
        Ok(self.get_product(product_id).await?.images)
    }

    /// Create a product with zero or more images
    ///
    /// A duplicate SKU is a conflict and leaves neither rows nor files.
    pub async fn create_product(
        &self,
        data: ProductCreate,
        images: Vec<UploadedImage>,
    ) -> AppResult<ProductFull> {
        let staged = self.cleanup.stage(&images).await?;

        match self.repo.create_product(&data, &staged).await {
            Ok(product) => {
                tracing::info!(
                    product_id = product.id,
                    sku = %product.sku,
                    images = product.images.len(),
                    "Product created"
                );
                Ok(product)
            }
            Err(e) => {
                self.cleanup.discard_staged(&staged).await;
                Err(match e {
                    RepoError::Duplicate(_) => sku_taken(&data.sku),
                    other => other.into(),
                })
            }
        }
    }

    /// Partial update with image removal and append
    ///
    /// Every id in `image_ids_to_delete` must belong to this product;
    /// otherwise the whole request is rejected before anything changes.
    pub async fn update_product(
        &self,
        id: i64,
        data: ProductUpdate,
        images: Vec<UploadedImage>,
    ) -> AppResult<ProductFull> {
        self.get_product(id).await?;

        if !data.image_ids_to_delete.is_empty() {
            let owned = self.repo.find_images(id, &data.image_ids_to_delete).await?;
            let missing: Vec<i64> = data
                .image_ids_to_delete
                .iter()
                .filter(|rid| !owned.iter().any(|img| img.id == **rid))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(image_not_found(id, &missing));
            }
        }

        let staged = self.cleanup.stage(&images).await?;

        let updated = match self.repo.update_product(id, &data, &staged).await {
            Ok(updated) => updated,
            Err(e) => {
                self.cleanup.discard_staged(&staged).await;
                return Err(match e {
                    RepoError::Duplicate(_) => {
                        sku_taken(data.sku.as_deref().unwrap_or_default())
                    }
                    // Product or image vanished after the checks above
                    RepoError::NotFound(_) => self.vanished(id, &data.image_ids_to_delete).await,
                    other => other.into(),
                });
            }
        };

        let report = self
            .cleanup
            .remove_files(&image_urls(&updated.removed_images))
            .await;

        tracing::info!(
            product_id = id,
            added = staged.len(),
            removed = updated.removed_images.len(),
            orphaned = report.failed.len(),
            "Product updated"
        );

        Ok(updated.product)
    }

    /// Name what went missing when a write found nothing to act on
    async fn vanished(&self, id: i64, image_ids: &[i64]) -> AppError {
        match self.repo.find_product(id).await {
            Ok(Some(_)) if !image_ids.is_empty() => image_not_found(id, image_ids),
            Ok(_) => product_not_found(id),
            Err(e) => e.into(),
        }
    }

    /// Delete a product, its image rows and (best-effort) its files
    pub async fn delete_product(&self, id: i64) -> AppResult<ProductDeleted> {
        let images = self.repo.delete_product(id).await.map_err(|e| match e {
            RepoError::NotFound(_) => product_not_found(id),
            other => other.into(),
        })?;

        let files = self.cleanup.remove_files(&image_urls(&images)).await;

        tracing::info!(
            product_id = id,
            images = images.len(),
            files_removed = files.removed,
            files_failed = files.failed.len(),
            "Product deleted"
        );

        Ok(ProductDeleted {
            message: "Product deleted successfully".to_string(),
            id,
            images_deleted: images.len(),
            files,
        })
    }

    /// Delete one image of a product
    ///
    /// The row goes first; a missing backing file does not fail the request.
    pub async fn delete_image(&self, product_id: i64, image_id: i64) -> AppResult<ImageDeleted> {
        let image = self
            .repo
            .delete_image(product_id, image_id)
            .await
            .map_err(|e| match e {
                RepoError::NotFound(_) => image_not_found(product_id, &[image_id]),
                other => other.into(),
            })?;

        let report = self
            .cleanup
            .remove_files(std::slice::from_ref(&image.url))
            .await;

        tracing::info!(
            product_id,
            image_id,
            file_removed = report.removed == 1,
            "Product image deleted"
        );

        Ok(ImageDeleted {
            message: "Product image deleted successfully".to_string(),
            id: image.id,
            product_id,
            file_removed: report.removed == 1,
        })
    }
}
