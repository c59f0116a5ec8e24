//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ProductImage;

/// Product entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    /// Unique stock keeping unit
    pub sku: String,
    pub name: String,
    /// NUMERIC(10,2), serialized as a JSON number
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Validated create payload (multipart form already parsed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreate {
    pub sku: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Validated partial update payload
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub name: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub price: Option<Decimal>,
    /// Images of this product to detach and delete
    #[serde(default)]
    pub image_ids_to_delete: Vec<i64>,
}

/// Product with its images, ordered by image id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFull {
    pub id: i64,
    pub sku: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub images: Vec<ProductImage>,
}

impl ProductFull {
    pub fn new(product: Product, images: Vec<ProductImage>) -> Self {
        Self {
            id: product.id,
            sku: product.sku,
            name: product.name,
            price: product.price,
            images,
        }
    }
}

/// Outcome of best-effort file removal after rows were deleted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCleanupReport {
    /// Files removed from storage
    pub removed: usize,
    /// Files that were already gone
    pub missing: usize,
    /// References whose deletion failed (orphaned, logged server-side)
    pub failed: Vec<String>,
}

impl FileCleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// DELETE /products/{id} response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub message: String,
    pub id: i64,
    pub images_deleted: usize,
    pub files: FileCleanupReport,
}
