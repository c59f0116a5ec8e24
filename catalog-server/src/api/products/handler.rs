//! Product API Handlers

use axum::{
    Json,
    extract::{Path, Request, State},
    http::StatusCode,
};
use shared::error::AppResult;
use shared::models::{ProductDeleted, ProductFull};

use crate::api::form::{ProductForm, parse_id};
use crate::state::AppState;

/// GET /products/all-products - all products with their images
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<ProductFull>>> {
    let products = state.catalog.list_products().await?;
    Ok(Json(products))
}

/// GET /products/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ProductFull>> {
    let id = parse_id(&id, "id")?;
    let product = state.catalog.get_product(id).await?;
    Ok(Json(product))
}

/// POST /products/create - multipart or JSON: sku, name, price, images
pub async fn create(
    State(state): State<AppState>,
    req: Request,
) -> AppResult<(StatusCode, Json<ProductFull>)> {
    let form = ProductForm::from_request(req, &state.uploads).await?;
    let (data, images) = form.into_create()?;

    let product = state.catalog.create_product(data, images).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products/{id} - optional sku, name, price, imageIdsToDelete, images
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> AppResult<Json<ProductFull>> {
    let id = parse_id(&id, "id")?;
    let form = ProductForm::from_request(req, &state.uploads).await?;
    let (data, images) = form.into_update()?;

    let product = state.catalog.update_product(id, data, images).await?;
    Ok(Json(product))
}

/// DELETE /products/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ProductDeleted>> {
    let id = parse_id(&id, "id")?;
    let result = state.catalog.delete_product(id).await?;
    Ok(Json(result))
}
