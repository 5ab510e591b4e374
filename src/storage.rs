//! Blob storage for uploaded report files.
//!
//! Validation (size, media type) happens before any bytes are handed to a
//! store, so an invalid upload never costs transport I/O. Store keys combine
//! the owner id, a millisecond timestamp and a random component so concurrent
//! uploads can never collide.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File too large: {size} bytes (maximum {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Persists an opaque byte payload under a derived key and returns a
/// retrievable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        owner_id: &str,
        bytes: &[u8],
        content_type: &str,
        original_name: &str,
    ) -> Result<String, StorageError>;
}

/// Check size and media type before any bytes are transmitted.
pub fn validate_upload(
    size: u64,
    content_type: &str,
    max_bytes: u64,
    allowed_types: &[String],
) -> Result<(), StorageError> {
    if size > max_bytes {
        return Err(StorageError::PayloadTooLarge { size, max: max_bytes });
    }
    if !allowed_types.iter().any(|t| t == content_type) {
        return Err(StorageError::UnsupportedMediaType(content_type.to_string()));
    }
    Ok(())
}

/// Resolve the effective media type of an upload.
///
/// Prefers the declared Content-Type; when the client sent none, falls back
/// to magic-byte sniffing, then to a filename-extension guess.
pub fn effective_content_type(
    declared: Option<&str>,
    bytes: &[u8],
    original_name: &str,
) -> String {
    if let Some(declared) = declared {
        let declared = declared.trim();
        if !declared.is_empty() && declared != "application/octet-stream" {
            return declared.to_string();
        }
    }
    let sniffed = detect_mime_from_bytes(bytes);
    if sniffed != "application/octet-stream" {
        return sniffed;
    }
    mime_guess::from_path(original_name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Detect MIME type from file magic bytes (not extension or header).
pub fn detect_mime_from_bytes(bytes: &[u8]) -> String {
    if bytes.len() < 4 {
        return "application/octet-stream".into();
    }

    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg".into();
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return "image/png".into();
    }
    // PDF: %PDF
    if bytes.starts_with(b"%PDF") {
        return "application/pdf".into();
    }

    "application/octet-stream".into()
}

/// Sanitize a filename — removes path traversal and special characters.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Remove consecutive dots (path traversal prevention)
    let sanitized = sanitized.replace("..", "");

    // Truncate to 100 characters. Char-wise: alphanumeric filter keeps
    // multibyte letters, so a byte slice could split a code point.
    let sanitized: String = sanitized.chars().take(100).collect();

    if sanitized.is_empty() {
        "report".into()
    } else {
        sanitized
    }
}

/// Derive the store key for an upload:
/// `reports/{owner}/{unix_millis}-{uuid}-{sanitized_name}`.
///
/// The timestamp keeps keys roughly chronological; the uuid guarantees
/// uniqueness when two uploads land in the same millisecond.
pub fn derive_key(owner_id: &str, original_name: &str) -> String {
    format!(
        "reports/{}/{}-{}-{}",
        owner_id,
        Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        sanitize_filename(original_name)
    )
}

/// Filesystem-backed blob store rooted in the server data directory.
///
/// Stored objects are retrievable at `{public_base_url}/files/{key}`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        owner_id: &str,
        bytes: &[u8],
        content_type: &str,
        original_name: &str,
    ) -> Result<String, StorageError> {
        let key = derive_key(owner_id, original_name);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        tracing::info!(
            owner = %owner_id,
            key = %key,
            size = bytes.len(),
            mime = %content_type,
            "Stored report file"
        );

        Ok(format!("{}/files/{}", self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        crate::config::ALLOWED_MIME_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    // -- Validation -----------------------------------------------------------

    #[test]
    fn oversized_payload_rejected() {
        let err = validate_upload(11 * 1024 * 1024, "application/pdf", 10 * 1024 * 1024, &allowed());
        assert!(matches!(err, Err(StorageError::PayloadTooLarge { .. })));
    }

    #[test]
    fn exact_limit_accepted() {
        let max = 10 * 1024 * 1024;
        assert!(validate_upload(max, "application/pdf", max, &allowed()).is_ok());
    }

    #[test]
    fn disallowed_type_rejected() {
        let err = validate_upload(100, "image/gif", 10 * 1024 * 1024, &allowed());
        assert!(matches!(err, Err(StorageError::UnsupportedMediaType(_))));
    }

    #[test]
    fn allowed_types_accepted() {
        for mime in ["application/pdf", "image/jpeg", "image/png"] {
            assert!(validate_upload(100, mime, 10 * 1024 * 1024, &allowed()).is_ok());
        }
    }

    // -- MIME resolution ------------------------------------------------------

    #[test]
    fn declared_type_wins() {
        assert_eq!(
            effective_content_type(Some("application/pdf"), b"\xFF\xD8\xFF\xE0", "x.jpg"),
            "application/pdf"
        );
    }

    #[test]
    fn sniffing_fills_in_missing_declaration() {
        assert_eq!(
            effective_content_type(None, b"%PDF-1.4 content", "report"),
            "application/pdf"
        );
        assert_eq!(
            effective_content_type(Some(""), &[0x89, 0x50, 0x4E, 0x47, 0x0D], "scan"),
            "image/png"
        );
    }

    #[test]
    fn extension_guess_is_last_resort() {
        assert_eq!(
            effective_content_type(None, &[0x00, 0x01, 0x02, 0x03], "scan.png"),
            "image/png"
        );
    }

    #[test]
    fn detect_known_magic_bytes() {
        assert_eq!(detect_mime_from_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_mime_from_bytes(b"%PDF-1.7"), "application/pdf");
        assert_eq!(detect_mime_from_bytes(&[0x01, 0x02, 0x03, 0x04]), "application/octet-stream");
        assert_eq!(detect_mime_from_bytes(&[]), "application/octet-stream");
    }

    // -- Filename sanitization ------------------------------------------------

    #[test]
    fn sanitize_path_traversal() {
        let result = sanitize_filename("../../../etc/passwd");
        assert!(!result.contains(".."));
        assert!(!result.contains('/'));
    }

    #[test]
    fn sanitize_preserves_valid_name() {
        assert_eq!(sanitize_filename("blood-report_2026.pdf"), "blood-report_2026.pdf");
    }

    #[test]
    fn sanitize_empty_name() {
        assert_eq!(sanitize_filename(""), "report");
    }

    #[test]
    fn sanitize_long_name() {
        assert!(sanitize_filename(&"a".repeat(300)).len() <= 100);
    }

    #[test]
    fn sanitize_multibyte_name_truncates_on_char_boundary() {
        // 150 chars, 450 bytes: a byte-indexed cut would split a code point.
        let result = sanitize_filename(&"あ".repeat(150));
        assert_eq!(result.chars().count(), 100);
        assert!(result.chars().all(|c| c == 'あ'));
    }

    #[test]
    fn sanitize_multibyte_name_with_extension() {
        let name = format!("{}.pdf", "あ".repeat(50));
        let result = sanitize_filename(&name);
        assert!(result.starts_with('あ'));
        assert!(result.ends_with(".pdf"));
    }

    // -- Key derivation -------------------------------------------------------

    #[test]
    fn keys_are_owner_scoped() {
        let key = derive_key("user-1", "report.pdf");
        assert!(key.starts_with("reports/user-1/"));
        assert!(key.ends_with("-report.pdf"));
    }

    #[test]
    fn concurrent_keys_never_collide() {
        let a = derive_key("user-1", "report.pdf");
        let b = derive_key("user-1", "report.pdf");
        assert_ne!(a, b);
    }

    // -- Local store ----------------------------------------------------------

    #[tokio::test]
    async fn put_writes_file_and_returns_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf(), "http://localhost:8787/");

        let url = store
            .put("alice", b"%PDF-1.4 test", "application/pdf", "report.pdf")
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:8787/files/reports/alice/"));

        let key = url.strip_prefix("http://localhost:8787/files/").unwrap();
        let written = std::fs::read(tmp.path().join(key)).unwrap();
        assert_eq!(written, b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn put_surfaces_io_failure() {
        // Root is a file, so creating subdirectories must fail.
        let tmp = tempfile::tempdir().unwrap();
        let blocked = tmp.path().join("not-a-dir");
        std::fs::write(&blocked, b"x").unwrap();

        let store = LocalBlobStore::new(blocked, "http://localhost:8787");
        let err = store
            .put("alice", b"data", "application/pdf", "report.pdf")
            .await;
        assert!(matches!(err, Err(StorageError::Unavailable(_))));
    }
}
