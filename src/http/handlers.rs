//! Endpoint handlers: upload, history, health.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use super::error::ApiError;
use super::router::AppContext;
use crate::models::{PatientProfile, Report};
use crate::pipeline::{AnalysisResponse, UploadFile, UploadRequest};

/// Pull the bearer credential out of the Authorization header, if any.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Map a multipart read failure to an API error.
///
/// A body over the router's limit surfaces here as a length-limit error;
/// report it as 413 like the pipeline's own size check, not a generic 400.
fn multipart_error(
    err: MultipartError,
    headers: &HeaderMap,
    max: u64,
    context: &str,
) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        return ApiError::PayloadTooLarge { size, max };
    }
    ApiError::InvalidInput(format!("{context}: {err}"))
}

/// `POST /upload` — multipart body with `file` and `patientData` fields.
pub async fn upload(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let credential = bearer_token(&headers);
    let max_upload_bytes = ctx.pipeline.max_upload_bytes();

    let mut file: Option<UploadFile> = None;
    let mut patient = PatientProfile::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &headers, max_upload_bytes, "Malformed multipart body"))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let original_name = field.file_name().unwrap_or("report").to_string();
                let declared_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    multipart_error(e, &headers, max_upload_bytes, "Failed to read file data")
                })?;
                file = Some(UploadFile {
                    bytes: bytes.to_vec(),
                    declared_type,
                    original_name,
                });
            }
            "patientData" => {
                let raw = field.text().await.unwrap_or_default();
                patient = PatientProfile::parse(&raw);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let response = ctx
        .pipeline
        .run(UploadRequest {
            credential,
            file,
            patient,
        })
        .await?;

    Ok(Json(response))
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub reports: Vec<Report>,
}

/// `GET /history` — the caller's reports, newest first.
pub async fn history(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, ApiError> {
    let credential = bearer_token(&headers);
    let reports = ctx.pipeline.history(credential.as_deref()).await?;
    Ok(Json(HistoryResponse { reports }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health` — static acknowledgment.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
    })
}
