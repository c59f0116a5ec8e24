//! Product API
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /products/all-products | GET | all products with images |
//! | /products/create | POST | create (multipart) |
//! | /products/{id} | GET | one product with images |
//! | /products/{id} | PUT | partial update (multipart) |
//! | /products/{id} | DELETE | delete product, images and files |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/products", product_routes())
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/all-products", get(handler::list))
        .route("/create", post(handler::create))
        .route(
            "/{id}",
            get(handler::get_by_id)
                .put(handler::update)
                .delete(handler::delete),
        )
}
