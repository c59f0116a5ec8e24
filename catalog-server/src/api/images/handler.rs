//! Product Image API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::error::AppResult;
use shared::models::{ImageDeleted, ProductImage};

use crate::api::form::parse_id;
use crate::state::AppState;

/// GET /products/{id}/images
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<ProductImage>>> {
    let id = parse_id(&id, "id")?;
    let images = state.catalog.list_images(id).await?;
    Ok(Json(images))
}

/// DELETE /products/{id}/images/{image_id}
///
/// The image must belong to the product in the path.
pub async fn delete(
    State(state): State<AppState>,
    Path((product_id, image_id)): Path<(String, String)>,
) -> AppResult<Json<ImageDeleted>> {
    let product_id = parse_id(&product_id, "productId")?;
    let image_id = parse_id(&image_id, "imageId")?;

    let result = state.catalog.delete_image(product_id, image_id).await?;
    Ok(Json(result))
}
