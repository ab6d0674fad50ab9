//! Maps `EngineError` onto the wire error shape `{errorCode, message,
//! details?}` (§7), grounded on the teacher's `IcebergErrorResponse` /
//! `into_response` pattern for catalog errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use noos_engine::{EngineError, ErrorKind};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    error_code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Dependency => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict | ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Busy => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wraps an `EngineError` so route handlers can use `?` and still produce
/// the documented JSON error body.
pub(crate) struct ApiError(pub(crate) EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }
        let body = WireError {
            error_code: error_code(self.0.kind()),
            message: self.0.message().to_string(),
            details: self.0.stack().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}

fn error_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "VALIDATION",
        ErrorKind::Dependency => "DEPENDENCY",
        ErrorKind::Conflict => "CONFLICT",
        ErrorKind::Busy => "BUSY",
        ErrorKind::NotFound => "NOT_FOUND",
        ErrorKind::Timeout => "TIMEOUT",
        ErrorKind::Cancelled => "CANCELLED",
        ErrorKind::Interrupted => "INTERRUPTED",
        ErrorKind::Internal => "INTERNAL",
    }
}
