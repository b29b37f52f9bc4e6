//! Errors the gateway synthesizes itself.
//!
//! Backend responses, including backend errors, are forwarded verbatim and
//! never pass through this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use healthbar_core::envelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No backend owns the request path.
    #[error("no route for {0}")]
    ServiceNotFound(String),

    /// The client's token bucket is empty.
    #[error("rate limit exceeded for {0}")]
    RateLimitExceeded(String),

    /// The backend could not be reached or did not answer in time.
    #[error("backend {service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// Should not occur in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// - `ServiceNotFound`: 404
    /// - `RateLimitExceeded`: 429
    /// - `Unavailable`: 503
    /// - `Internal`: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-facing message. Never contains request or backend details.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::ServiceNotFound(_) => "Service not found",
            Self::RateLimitExceeded(_) => "Rate limit exceeded. Too many requests.",
            Self::Unavailable { .. } => "Service unavailable",
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        envelope::failure(self.status_code(), self.public_message())
    }
}
