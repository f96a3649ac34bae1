use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("A file with that name already exists")]
    NameConflict,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::NameConflict => (StatusCode::CONFLICT, self.to_string()),
            AppError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "File not found".to_string())
            }
            AppError::Storage(StorageError::NameConflict(_)) => {
                (StatusCode::CONFLICT, "A file with that name already exists".to_string())
            }
            AppError::Storage(StorageError::InvalidName(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid file name".to_string())
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                AppError::Validation("bad input".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::EmailTaken, StatusCode::CONFLICT),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::NotFound("image"), StatusCode::NOT_FOUND),
            (AppError::NameConflict, StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AppError::Internal(anyhow::anyhow!("secret connection string"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
