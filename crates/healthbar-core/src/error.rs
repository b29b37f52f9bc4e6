//! API error type.
//!
//! Handlers return `Result<Response, ApiError>`. Each variant carries the
//! public message placed in the envelope's `error` field; internal details
//! are logged where the error is created and never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::envelope;
use crate::store::StoreError;

/// Errors surfaced to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Malformed or incomplete input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, malformed or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An upload was refused for its size or type.
    #[error("payload rejected: {0}")]
    PayloadRejected(String),

    /// A dependency is unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure. The message is public and must be generic.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::PayloadRejected(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the public message.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::PayloadRejected(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => m,
        }
    }

    /// Logs `cause` and returns an internal error carrying `public`.
    pub fn internal(public: &str, cause: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "{public}");
        Self::Internal(public.to_string())
    }

    /// The 403 returned for every failed access check.
    #[must_use]
    pub fn access_denied() -> Self {
        Self::Forbidden("Access denied".to_string())
    }

    /// Shorthand for a 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Shorthand for a 404 with `message`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Shorthand for a 403 with `message`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("Not found".to_string()),
            StoreError::Conflict(_) => Self::Conflict("Resource already exists".to_string()),
            other => Self::internal("Internal server error", &other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        envelope::failure(self.status_code(), self.public_message())
    }
}
