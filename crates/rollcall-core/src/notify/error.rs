use thiserror::Error;

use crate::utils::truncate_string;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid contact number: {0}")]
    InvalidContact(String),

    #[error("Unauthorized - check messaging credentials")]
    Unauthorized,

    #[error("Rejected by messaging service: {0}")]
    Rejected(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl NotifyError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_string(body, MAX_ERROR_BODY_LENGTH);
        match status.as_u16() {
            401 | 403 => NotifyError::Unauthorized,
            400 | 404 | 422 => NotifyError::Rejected(truncated),
            429 => NotifyError::RateLimited,
            500..=599 => NotifyError::ServerError(truncated),
            _ => NotifyError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
