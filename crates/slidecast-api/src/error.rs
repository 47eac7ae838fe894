//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use slidecast_models::CaptionError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Request-level errors, mapped to HTTP statuses.
///
/// Probe unavailability is deliberately absent: a failed duration probe falls
/// back to the engine's own inference and never surfaces to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing asset: {0}. Send it as a file upload or a URL field.")]
    MissingAsset(&'static str),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Download timed out after {0} seconds")]
    DownloadTimeout(u64),

    #[error("Server at capacity: memory usage {used_bytes} of {limit_bytes} bytes")]
    Capacity { used_bytes: u64, limit_bytes: u64 },

    #[error("Render failed: {message}")]
    Render {
        message: String,
        details: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>, details: Option<String>) -> Self {
        Self::Render {
            message: msg.into(),
            details,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MissingAsset(_) => StatusCode::BAD_REQUEST,
            ApiError::Download(_) => StatusCode::BAD_GATEWAY,
            ApiError::DownloadTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Capacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Render { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CaptionError> for ApiError {
    fn from(e: CaptionError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let details = match &self {
            ApiError::Render { details, .. } => details.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::MissingAsset("audio").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Download("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::DownloadTimeout(30).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Capacity {
                used_bytes: 1,
                limit_bytes: 1
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::render("x", None).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_caption_error_is_validation() {
        let err: ApiError = CaptionError::EmptyText { index: 2 }.into();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(err.to_string().contains("caption 2"));
    }
}
