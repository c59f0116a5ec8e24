//! Service layer

pub mod catalog;
pub mod image_cleanup;

pub use catalog::CatalogService;
pub use image_cleanup::ImageCleanupService;
