//! HTTP API
//!
//! All routes share one state ([`AppState`]), permissive CORS, request
//! logging and a body limit sized for a full upload batch.

pub mod form;
pub mod health;
pub mod images;
pub mod products;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::middleware::logging_middleware;
use crate::state::AppState;

/// Build the application router
///
/// With local storage, uploaded files are served under their URL prefix.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.uploads.body_limit();

    let mut router = Router::new()
        .merge(health::router())
        .merge(products::router())
        .merge(images::router());

    if let Some(files) = &state.static_files {
        router = router.nest_service(&files.url_prefix, ServeDir::new(&files.dir));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(logging_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
