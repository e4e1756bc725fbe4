//! HTTP error type and mappings from store errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use voxhub_core::StoreError;

/// Errors returned before a connection is upgraded.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Missing or malformed request data.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Device is unknown or not bound.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a device lookup failure: unknown and unbound devices are refused.
    pub fn from_admission(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::NotBound(_) => Self::Forbidden(err.to_string()),
            StoreError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_map_to_status() {
        let cases = [
            (StoreError::NotFound("aa".into()), StatusCode::FORBIDDEN),
            (StoreError::NotBound("aa".into()), StatusCode::FORBIDDEN),
            (
                StoreError::Storage("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError::from_admission(err).status(), status);
        }
    }

    #[test]
    fn generic_store_error_is_internal() {
        let err: HttpError = StoreError::NotFound("session".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
