//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PipelineError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
    /// Present only for persistence failures: the artifact was stored even
    /// though the record write failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid request: {0}")]
    InvalidInput(String),
    #[error("Payload too large")]
    PayloadTooLarge { size: u64, max: u64 },
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Storage unavailable")]
    StorageUnavailable(String),
    #[error("Extraction failed")]
    ExtractionFailed(String),
    #[error("Persistence failed")]
    PersistenceFailed { file_url: String, reason: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut file_url = None;
        let (status, code, message) = match &self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Invalid or expired token".to_string(),
            ),
            ApiError::InvalidInput(detail) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", detail.clone())
            }
            ApiError::PayloadTooLarge { size, max } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!(
                    "File too large: {size} bytes (maximum {}MB)",
                    max / (1024 * 1024)
                ),
            ),
            ApiError::UnsupportedMediaType(mime) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                format!("File type not supported: {mime}. Send a PDF, JPEG or PNG."),
            ),
            ApiError::StorageUnavailable(detail) => {
                tracing::error!(detail, "Blob storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "File storage is temporarily unavailable. Please retry.".to_string(),
                )
            }
            ApiError::ExtractionFailed(detail) => {
                tracing::error!(detail, "Text extraction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EXTRACTION_FAILED",
                    "Could not read the uploaded report. Try a clearer copy.".to_string(),
                )
            }
            ApiError::PersistenceFailed { file_url: url, reason } => {
                tracing::error!(reason, "Report record write failed after upload");
                file_url = Some(url.clone());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_FAILED",
                    "The file was stored but the report record could not be saved. Please retry."
                        .to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
            file_url,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Unauthenticated => ApiError::Unauthenticated,
            PipelineError::InvalidInput(detail) => ApiError::InvalidInput(detail),
            PipelineError::PayloadTooLarge { size, max } => {
                ApiError::PayloadTooLarge { size, max }
            }
            PipelineError::UnsupportedMediaType(mime) => ApiError::UnsupportedMediaType(mime),
            PipelineError::StorageUnavailable(detail) => ApiError::StorageUnavailable(detail),
            PipelineError::ExtractionFailed(detail) => ApiError::ExtractionFailed(detail),
            PipelineError::PersistenceFailed { file_url, reason } => {
                ApiError::PersistenceFailed { file_url, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthenticated_returns_401() {
        let response = ApiError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn invalid_input_returns_400() {
        let response = ApiError::InvalidInput("No file uploaded".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payload_too_large_returns_413() {
        let response = ApiError::PayloadTooLarge {
            size: 11 * 1024 * 1024,
            max: 10 * 1024 * 1024,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unsupported_media_type_returns_415() {
        let response = ApiError::UnsupportedMediaType("image/gif".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn storage_unavailable_returns_503_with_safe_message() {
        let response =
            ApiError::StorageUnavailable("connection refused 10.0.0.5:9000".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        // Transport detail must not leak to the client.
        assert!(!json["error"]["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn persistence_failure_carries_file_url() {
        let response = ApiError::PersistenceFailed {
            file_url: "http://localhost/files/reports/a/1-x-r.pdf".into(),
            reason: "db offline".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 2048).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "PERSISTENCE_FAILED");
        assert_eq!(json["file_url"], "http://localhost/files/reports/a/1-x-r.pdf");
        // The internal reason stays server-side.
        assert!(!json["error"]["message"].as_str().unwrap().contains("db offline"));
    }

    #[tokio::test]
    async fn other_errors_omit_file_url() {
        let response = ApiError::Internal("boom".into()).into_response();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("file_url").is_none());
    }

    #[test]
    fn pipeline_errors_map_across() {
        let api: ApiError = PipelineError::Unauthenticated.into();
        assert!(matches!(api, ApiError::Unauthenticated));

        let api: ApiError = PipelineError::PersistenceFailed {
            file_url: "u".into(),
            reason: "r".into(),
        }
        .into();
        assert!(matches!(api, ApiError::PersistenceFailed { .. }));
    }
}
