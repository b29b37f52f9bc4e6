//! The JSON response envelope.
//!
//! Every response body produced by the gateway or a backend service, other
//! than file downloads and the metrics exposition, has the shape
//!
//! ```json
//! {"success": true, "message": "...", "data": {...}}
//! {"success": false, "error": "..."}
//! ```
//!
//! `success` is true exactly when the status code is 2xx. Absent fields are
//! omitted rather than serialized as `null`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The uniform response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Builds a success body.
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
            error: None,
        }
    }

    /// Builds a failure body.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Returns a 2xx response carrying `data`.
///
/// Non-2xx statuses are a programming error; they are coerced to 200 so the
/// `success` flag never disagrees with the status line.
pub fn success<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let status = if status.is_success() {
        status
    } else {
        debug_assert!(false, "success envelope with status {status}");
        StatusCode::OK
    };
    match serde_json::to_value(data) {
        Ok(value) => (status, Json(ApiResponse::ok(message, Some(value)))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response data");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        },
    }
}

/// Returns a 2xx response with a message and no data.
pub fn message(status: StatusCode, message: impl Into<String>) -> Response {
    let status = if status.is_success() {
        status
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::<Value>::ok(message, None))).into_response()
}

/// Returns a non-2xx failure response.
///
/// A 2xx status here would contradict `success: false`; it is coerced to 500.
pub fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let status = if status.is_success() {
        debug_assert!(false, "failure envelope with status {status}");
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        status
    };
    (status, Json(ApiResponse::<Value>::error(error))).into_response()
}
