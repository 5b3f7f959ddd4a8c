//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::BadRequest(message) => AppError::BadRequest(message),
            DispatchError::Unauthorized(message) => AppError::Unauthorized(message),
            DispatchError::Internal(message) => AppError::Internal(anyhow::anyhow!(message)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Internal details go to the log only
        let error = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::bad_request("Invalid Query Class"), StatusCode::BAD_REQUEST),
            (
                DispatchError::Unauthorized("Unauthorized to query [dbEntity=Movie]".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                DispatchError::Internal("query execution failed".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
