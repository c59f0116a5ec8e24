//! Infrastructure errors mapped onto the API error type
//!
//! Database and storage failures are logged here with full detail and reach
//! the client only as a generic message. Not-found and duplicate conditions
//! keep their meaning.

use shared::error::{AppError, ErrorCode};

use crate::db::RepoError;
use crate::storage::StorageError;

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => {
                AppError::with_message(ErrorCode::NotFound, format!("{what} not found"))
            }
            RepoError::Duplicate(constraint) => {
                tracing::debug!(constraint = %constraint, "Unique constraint violated");
                AppError::with_message(ErrorCode::AlreadyExists, "Resource already exists")
            }
            RepoError::Validation(msg) => AppError::validation(msg),
            RepoError::Unavailable(msg) => {
                tracing::error!(error = %msg, "Database unavailable");
                AppError::new(ErrorCode::DatabaseUnavailable)
            }
            RepoError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Image storage error");
        AppError::new(ErrorCode::FileStorageFailed)
    }
}
