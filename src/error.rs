//! Error taxonomy for the forage-monitor service.
//!
//! Validation failures map to `400 Bad Request`; upstream failures are
//! normally absorbed into tagged outcomes by the analysis pipeline and only
//! reach the HTTP layer if a handler chooses to propagate them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    // Request validation
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Remote collaborators
    #[error("Upstream fetch from {source_name} failed: {cause}")]
    UpstreamFetch { source_name: String, cause: String },

    #[error("Reduction over {count} pixels exceeds the cap of {cap}")]
    TooManyPixels { count: u64, cap: u64 },
}

impl ServiceError {
    /// Shorthand for an [`ServiceError::UpstreamFetch`] from a named source.
    pub fn upstream(source_name: &str, cause: impl ToString) -> Self {
        ServiceError::UpstreamFetch {
            source_name: source_name.to_string(),
            cause: cause.to_string(),
        }
    }

    /// True for errors caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidGeometry(_)
                | ServiceError::InvalidDateRange(_)
                | ServiceError::InvalidRequest(_)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        let source_name = e
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "remote".to_string());
        let cause = if e.is_timeout() {
            format!("timed out: {e}")
        } else {
            e.to_string()
        };
        ServiceError::UpstreamFetch { source_name, cause }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::upstream("remote", format!("malformed payload: {e}"))
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServiceError::InvalidGeometry(_) => (StatusCode::BAD_REQUEST, "INVALID_GEOMETRY"),
            ServiceError::InvalidDateRange(_) => (StatusCode::BAD_REQUEST, "INVALID_DATE_RANGE"),
            ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServiceError::UpstreamFetch { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_FETCH"),
            ServiceError::TooManyPixels { .. } => (StatusCode::BAD_GATEWAY, "TOO_MANY_PIXELS"),
        };

        if self.is_validation() {
            tracing::debug!("Rejected request: {}", self);
        } else {
            tracing::error!("Error: {:?}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the service
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        // ---
        let resp = ServiceError::InvalidGeometry("ring has 2 vertices".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ServiceError::InvalidDateRange("start after end".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        // ---
        let err = ServiceError::upstream("power", "503 Service Unavailable");
        assert!(!err.is_validation());
        assert_eq!(
            err.to_string(),
            "Upstream fetch from power failed: 503 Service Unavailable"
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn malformed_json_is_an_upstream_failure() {
        // ---
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ServiceError = parse_err.into();
        assert!(matches!(err, ServiceError::UpstreamFetch { .. }));
    }
}
