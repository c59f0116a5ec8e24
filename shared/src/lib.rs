//! Shared types for the product catalog
//!
//! Error codes, API response envelope and catalog models used by the
//! server and by any client that talks to it.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
