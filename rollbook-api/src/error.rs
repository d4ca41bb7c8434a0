//! Error types for rollbook-api
//!
//! Every handler failure converts to one of these at the operation
//! boundary; raw sqlx/reqwest errors never reach the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Referenced student or record does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more request-level validation failures (400)
    #[error("Validation failed: {0:?}")]
    Validation(Vec<String>),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Duplicate external identifier (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Chat-completions service failure, message already sanitized (500)
    #[error("{0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// rollbook-common error
    #[error(transparent)]
    Common(#[from] rollbook_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, violations) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(errors),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            ApiError::Database(ref err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            ApiError::Common(ref err) => match err {
                rollbook_common::Error::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, msg.clone(), None)
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.to_string(),
                    None,
                ),
            },
            ApiError::Other(ref err) => {
                tracing::error!("Unhandled error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "success": false,
            "message": message,
        });
        if let Some(errors) = violations {
            body["errors"] = json!(errors);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
