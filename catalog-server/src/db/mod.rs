//! Catalog persistence
//!
//! [`CatalogRepository`] is the seam between the service layer and the
//! relational store. Every multi-row change it offers runs in a single
//! transaction; image lookups are always scoped to the owning product.

mod postgres;

use async_trait::async_trait;
use shared::models::{ProductCreate, ProductFull, ProductImage, ProductUpdate};
use thiserror::Error;

pub use postgres::PgCatalogRepository;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The database could not be reached at all
    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(db.constraint().unwrap_or("unique").to_string())
            }
            sqlx::Error::Database(db) if db.is_check_violation() => {
                RepoError::Validation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepoError::Unavailable(err.to_string())
            }
            _ => RepoError::Database(err.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Result of a committed product update
#[derive(Debug, Clone)]
pub struct UpdatedProduct {
    pub product: ProductFull,
    /// Image rows removed by the update (their files still exist)
    pub removed_images: Vec<ProductImage>,
}

/// Product and image persistence
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All products with their images, ordered by id
    async fn list_products(&self) -> RepoResult<Vec<ProductFull>>;

    async fn find_product(&self, id: i64) -> RepoResult<Option<ProductFull>>;

    /// Images of `product_id` whose id is in `image_ids`
    ///
    /// Ids owned by another product are silently absent from the result.
    async fn find_images(&self, product_id: i64, image_ids: &[i64])
    -> RepoResult<Vec<ProductImage>>;

    /// Insert a product and one image row per reference, atomically
    ///
    /// A taken SKU yields [`RepoError::Duplicate`] and nothing is written.
    async fn create_product(
        &self,
        data: &ProductCreate,
        image_urls: &[String],
    ) -> RepoResult<ProductFull>;

    /// Apply field changes, remove `data.image_ids_to_delete` and append new
    /// image rows, atomically
    ///
    /// Fails with [`RepoError::NotFound`] (and changes nothing) when the
    /// product is missing or any id to delete is not one of its images.
    async fn update_product(
        &self,
        id: i64,
        data: &ProductUpdate,
        new_image_urls: &[String],
    ) -> RepoResult<UpdatedProduct>;

    /// Delete a product and its image rows, returning the removed images
    async fn delete_product(&self, id: i64) -> RepoResult<Vec<ProductImage>>;

    /// Delete one image row scoped to its product
    async fn delete_image(&self, product_id: i64, image_id: i64) -> RepoResult<ProductImage>;

    /// Round-trip to the database
    async fn ping(&self) -> RepoResult<()>;

    /// Release connections; called once after shutdown
    async fn close(&self);
}
