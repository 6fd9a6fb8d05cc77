//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use livechat_shared::StoreError;
use serde_json::json;

/// Failure of a session operation, reported back to the originating
/// connection as an `error` event.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl SessionError {
    /// Stable code for the client-facing error event
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::Unauthorized(_) => "UNAUTHORIZED",
            SessionError::Validation(_) => "VALIDATION_ERROR",
            SessionError::Upstream(_) => "UPSTREAM_FAILURE",
        }
    }

    /// Message safe to show to clients
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Upstream(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => SessionError::NotFound("Conversation"),
            other => {
                tracing::error!(error = %other, "Session store error");
                SessionError::Upstream(other.to_string())
            }
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Backend errors
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),

            // Validation
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ApiError::NotFound,
            SessionError::Unauthorized(msg) => ApiError::Forbidden(msg),
            SessionError::Validation(msg) => ApiError::Validation(msg),
            SessionError::Upstream(_) => ApiError::ServiceUnavailable,
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
