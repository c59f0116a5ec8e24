//! catalog-server: product catalog REST backend
//!
//! Products with SKU, name and price, each owning zero or more images kept
//! in local disk or S3 storage. The interesting part is keeping image rows
//! and stored files consistent across failures; see
//! [`services::ImageCleanupService`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod services;
pub mod state;
pub mod storage;

pub use api::create_router;
pub use config::Config;
pub use state::AppState;
