//! Error types for Borrowdesk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned alongside the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BookNotAvailable = 5,
    PeriodAlreadyBorrowed = 6,
    Duplicate = 7,
    BadValue = 8,
    Forbidden = 9,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An approved request already covers part of the requested period
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No copy of the book is left in inventory
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthorized,
            AppError::Authorization(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Conflict(_) => ErrorCode::PeriodAlreadyBorrowed,
            AppError::Unavailable(_) => ErrorCode::BookNotAvailable,
            AppError::AlreadyExists(_) => ErrorCode::Duplicate,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
