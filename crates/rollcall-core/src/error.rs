use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, AttendanceError>;

/// Failures surfaced by the reconciler to its callers.
///
/// Skipped identifiers in lenient or batch operations are not errors; they
/// travel in the outcome's `skipped` list instead.
#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

impl AttendanceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AttendanceError::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AttendanceError::NotFound(message.into())
    }
}
