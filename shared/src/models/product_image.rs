//! Product Image Model

use serde::{Deserialize, Serialize};

/// Maximum length of a stored image reference (VARCHAR(500))
pub const MAX_IMAGE_URL_LEN: usize = 500;

/// Image row owned by exactly one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProductImage {
    pub id: i64,
    /// Storage reference (local path or object URL)
    pub url: String,
    pub product_id: i64,
}

/// DELETE /products/{productId}/images/{imageId} response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDeleted {
    pub message: String,
    pub id: i64,
    pub product_id: i64,
    /// False when the backing file was already gone or could not be removed
    pub file_removed: bool,
}
