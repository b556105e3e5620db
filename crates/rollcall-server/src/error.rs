//! HTTP error responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollcall_core::AttendanceError;
use thiserror::Error;
use tracing::error;

/// Message returned for unmatched routes
pub const ROUTE_NOT_FOUND: &str = "Route Not Found";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        match err {
            AttendanceError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AttendanceError::NotFound(msg) => ApiError::NotFound(msg),
            AttendanceError::PersistenceFailure(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref detail) = self {
            error!(error = %detail, "Request failed");
        }
        let body = serde_json::json!({ "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::StoreError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AttendanceError::invalid("bad date"), StatusCode::BAD_REQUEST),
            (AttendanceError::not_found("no record"), StatusCode::NOT_FOUND),
            (
                StoreError::Unavailable("down".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = ApiError::from(AttendanceError::from(StoreError::Unavailable(
            "/var/lib/rollcall locked".to_string(),
        )));
        assert_eq!(err.to_string(), "Internal server error");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
