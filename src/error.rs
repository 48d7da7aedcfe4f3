//! Error types for Junction
//!
//! This module defines the application error enum used throughout the
//! gateway and its mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("No provider named '{0}' is configured")]
    UnknownProvider(String),

    #[error("Provider '{0}' is disabled")]
    ProviderDisabled(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Failed to read request body: {0}")]
    InboundRead(String),

    #[error("Failed to build upstream request: {0}")]
    RequestBuild(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    /// The HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::UnknownProvider(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProviderDisabled(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::InboundRead(_)
            | AppError::RequestBuild(_)
            | AppError::Storage(_)
            | AppError::Redis(_)
            | AppError::Json(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::UnknownProvider(_) => "PROVIDER_NOT_FOUND",
            AppError::ProviderDisabled(_) => "PROVIDER_DISABLED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InboundRead(_) => "BODY_READ_FAILED",
            AppError::RequestBuild(_) => "UPSTREAM_REQUEST_INVALID",
            AppError::Upstream(_) => "UPSTREAM_UNREACHABLE",
            AppError::Storage(_) | AppError::Redis(_) | AppError::Json(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Storage and internal failures carry details we don't want to leak
        // to callers; everything else is safe to echo.
        let message = match &self {
            AppError::Storage(_) | AppError::Redis(_) | AppError::Json(_) => {
                "Storage service error".to_string()
            }
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
