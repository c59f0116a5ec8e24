//! Product image API

mod handler;

use axum::{
    Router,
    routing::{delete, get},
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products/{id}/images", get(handler::list))
        .route(
            "/products/{id}/images/{image_id}",
            delete(handler::delete),
        )
}
