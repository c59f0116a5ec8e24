//! Data models
//!
//! Shared between catalog-server and its API clients.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (PostgreSQL BIGSERIAL).

pub mod product;
pub mod product_image;

// Re-exports
pub use product::*;
pub use product_image::*;
