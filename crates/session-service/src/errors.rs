use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The presented refresh token is unknown, expired, or already rotated.
    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Authenticated, but not allowed to act on the target.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl SessionError {
    /// Wrap a cache failure with the step that produced it.
    pub fn cache(step: &str, err: CacheError) -> Self {
        SessionError::Cache(format!("{step}: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            SessionError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            SessionError::RefreshTokenNotFound => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session has expired. Please sign in again.".to_string(),
            ),
            SessionError::UserNotFound => (
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                "User not found".to_string(),
            ),
            SessionError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            SessionError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            SessionError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            SessionError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            SessionError::Cache(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CACHE_UNAVAILABLE",
                "Session store is temporarily unavailable".to_string(),
            ),
            SessionError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "An internal database error occurred".to_string(),
            ),
            SessionError::Signing(_) | SessionError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CRYPTO_ERROR",
                "An internal cryptographic error occurred".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(target: "session.errors", error = %self, "Request failed");
        }

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
