//! Text recognition and lab-value extraction.
//!
//! Two stages: a recognizer turns file bytes into plain text (the OCR seam),
//! then pattern matching pulls structured values out of that text. A label
//! with no parsable number yields `None` for that field — only a recognizer
//! failure is an error.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ExtractedData;

/// Recognized text is truncated to this many characters before being
/// retained or forwarded downstream.
pub const RAW_TEXT_LIMIT: usize = 2500;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Cannot reach OCR service at {0}")]
    OcrConnection(String),

    #[error("OCR service error (status {status}): {body}")]
    OcrService { status: u16, body: String },
}

/// Turns a file's bytes into plain text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

/// Extract structured lab values from recognized text.
///
/// Case-insensitive: the first `glucose` label followed by an optional
/// `:` or `-` separator and an integer; likewise `hba1c` capturing a
/// decimal number. Misses yield `None`, never an error.
pub fn extract_fields(text: &str) -> ExtractedData {
    static GLUCOSE: OnceLock<Regex> = OnceLock::new();
    static HBA1C: OnceLock<Regex> = OnceLock::new();

    let glucose_re =
        GLUCOSE.get_or_init(|| Regex::new(r"(?i)glucose\s*[:\-]?\s*(\d+)").expect("valid regex"));
    let hba1c_re =
        HBA1C.get_or_init(|| Regex::new(r"(?i)hba1c\s*[:\-]?\s*(\d+\.?\d*)").expect("valid regex"));

    let glucose = glucose_re
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let hba1c = hba1c_re
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    ExtractedData { glucose, hba1c }
}

/// Bound recognized text to `RAW_TEXT_LIMIT` characters.
pub fn truncate_raw_text(text: &str) -> String {
    text.chars().take(RAW_TEXT_LIMIT).collect()
}

// ---------------------------------------------------------------------------
// Embedded-text recognizer (no OCR model required)
// ---------------------------------------------------------------------------

/// Recognizer for files that carry their text directly: UTF-8 documents are
/// read as-is, and PDFs with uncompressed text objects fall back to a
/// printable-run scan. Scanned images need the remote OCR recognizer.
pub struct EmbeddedTextRecognizer;

#[async_trait]
impl TextRecognizer for EmbeddedTextRecognizer {
    async fn recognize(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::Recognition("empty file".into()));
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(text.to_string());
        }

        let scanned = printable_runs(bytes);
        if scanned.trim().is_empty() {
            return Err(ExtractError::Recognition(format!(
                "no embedded text found in {content_type} file"
            )));
        }
        Ok(scanned)
    }
}

/// Collect printable ASCII runs of at least 4 characters.
fn printable_runs(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut run = String::new();
    for &b in bytes {
        if (0x20..0x7F).contains(&b) {
            run.push(b as char);
        } else {
            if run.len() >= 4 {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&run);
            }
            run.clear();
        }
    }
    if run.len() >= 4 {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&run);
    }
    out
}

// ---------------------------------------------------------------------------
// Remote OCR recognizer
// ---------------------------------------------------------------------------

const OCR_SYSTEM_PROMPT: &str = "You are a precise document transcription engine. \
Transcribe ALL text from the provided document image exactly as written, \
preserving line breaks. Output only the transcribed text.";

const OCR_USER_PROMPT: &str = "Transcribe all visible text from this document.";

/// OCR over an Ollama-style vision endpoint: the file is base64-encoded and
/// submitted to `/api/generate` alongside a transcription prompt.
pub struct RemoteOcrClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl RemoteOcrClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }
}

#[derive(Serialize)]
struct OcrGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct OcrGenerateResponse {
    response: String,
}

#[async_trait]
impl TextRecognizer for RemoteOcrClient {
    async fn recognize(&self, bytes: &[u8], _content_type: &str) -> Result<String, ExtractError> {
        let url = format!("{}/api/generate", self.base_url);
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = OcrGenerateRequest {
            model: &self.model,
            prompt: OCR_USER_PROMPT,
            system: OCR_SYSTEM_PROMPT,
            images: vec![encoded],
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ExtractError::OcrConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    ExtractError::Recognition(format!(
                        "OCR request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    ExtractError::Recognition(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::OcrService {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OcrGenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Recognition(e.to_string()))?;
        Ok(parsed.response)
    }
}
