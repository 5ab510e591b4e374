//! Analysis pipeline — orchestrates one upload request end to end.
//!
//! Per-request state machine:
//! `Received → Authenticated → Stored → Extracted → Recommended → Persisted
//! → Responded`, with a terminal failure reachable from any step. Each
//! request is processed at most once; there are no internal retries — the
//! client resubmits on failure.
//!
//! Collaborators are injected at construction as trait objects, so the
//! pipeline never reaches for ambient/global handles.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{AuthError, IdentityVerifier};
use crate::extract::{self, ExtractError, TextRecognizer};
use crate::models::{PatientProfile, ReportStatus};
use crate::recommend::Recommender;
use crate::storage::{self, BlobStore, StorageError};
use crate::store::{NewReport, ReportStore, StoreError};

/// Why a request failed, mapped to an HTTP status by the API layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid or expired credential")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {size} bytes (maximum {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    /// The blob was stored but the record write failed. The already-obtained
    /// file URL is carried so the caller learns the artifact exists.
    #[error("Failed to persist report record: {reason}")]
    PersistenceFailed {
        file_url: String,
        reason: String,
    },
}

impl From<AuthError> for PipelineError {
    fn from(_: AuthError) -> Self {
        PipelineError::Unauthenticated
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PayloadTooLarge { size, max } => {
                PipelineError::PayloadTooLarge { size, max }
            }
            StorageError::UnsupportedMediaType(t) => PipelineError::UnsupportedMediaType(t),
            StorageError::Unavailable(reason) => PipelineError::StorageUnavailable(reason),
        }
    }
}

/// One uploaded file, as received from the multipart body.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    pub declared_type: Option<String>,
    pub original_name: String,
}

/// One upload request after multipart parsing.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub credential: Option<String>,
    pub file: Option<UploadFile>,
    pub patient: PatientProfile,
}

/// Canonical response shape for a successful analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub report_id: Uuid,
    pub file_url: String,
    pub glucose: Option<u32>,
    pub hba1c: Option<f64>,
    pub recommendations: String,
    pub status: ReportStatus,
}

pub struct AnalysisPipeline {
    verifier: Arc<dyn IdentityVerifier>,
    blobs: Arc<dyn BlobStore>,
    reports: Arc<dyn ReportStore>,
    recognizer: Arc<dyn TextRecognizer>,
    recommender: Recommender,
    max_upload_bytes: u64,
    allowed_types: Vec<String>,
}

impl AnalysisPipeline {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        blobs: Arc<dyn BlobStore>,
        reports: Arc<dyn ReportStore>,
        recognizer: Arc<dyn TextRecognizer>,
        recommender: Recommender,
        max_upload_bytes: u64,
        allowed_types: Vec<String>,
    ) -> Self {
        Self {
            verifier,
            blobs,
            reports,
            recognizer,
            recommender,
            max_upload_bytes,
            allowed_types,
        }
    }

    /// Configured per-file upload ceiling in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Run one upload through the full pipeline.
    pub async fn run(&self, request: UploadRequest) -> Result<AnalysisResponse, PipelineError> {
        // Received → Authenticated. The verified id is the tenancy key for
        // every later step; nothing below accepts a caller-supplied id.
        let credential = request
            .credential
            .as_deref()
            .ok_or(PipelineError::Unauthenticated)?;
        let owner_id = self.verifier.verify(credential).await?;
        tracing::debug!(owner = %owner_id, stage = "authenticated", "Upload authenticated");

        // Authenticated → Stored. Validation runs before any bytes move.
        let file = request
            .file
            .ok_or_else(|| PipelineError::InvalidInput("No file uploaded".to_string()))?;
        if file.bytes.is_empty() {
            return Err(PipelineError::InvalidInput("Empty file".to_string()));
        }

        let content_type = storage::effective_content_type(
            file.declared_type.as_deref(),
            &file.bytes,
            &file.original_name,
        );
        storage::validate_upload(
            file.bytes.len() as u64,
            &content_type,
            self.max_upload_bytes,
            &self.allowed_types,
        )?;

        let file_url = self
            .blobs
            .put(&owner_id, &file.bytes, &content_type, &file.original_name)
            .await?;
        tracing::debug!(owner = %owner_id, stage = "stored", url = %file_url, "File stored");

        // Stored → Extracted. Only a recognizer-level error fails the
        // request; pattern misses leave fields null and continue.
        let raw_text = self
            .recognizer
            .recognize(&file.bytes, &content_type)
            .await
            .map_err(|e: ExtractError| PipelineError::ExtractionFailed(e.to_string()))?;
        let context_text = extract::truncate_raw_text(&raw_text);
        let extracted = extract::extract_fields(&context_text);
        tracing::debug!(
            owner = %owner_id,
            stage = "extracted",
            glucose = ?extracted.glucose,
            hba1c = ?extracted.hba1c,
            "Lab values extracted"
        );

        // Extracted → Recommended. Never fails the request.
        let recommendations = self
            .recommender
            .generate(&request.patient, extracted.glucose, extracted.hba1c, &context_text)
            .await;

        // Recommended → Persisted. A failure here still reports the blob
        // URL: the artifact exists independently of the record.
        let report = self
            .reports
            .create(NewReport {
                owner_id: owner_id.clone(),
                file_url: file_url.clone(),
                extracted,
                recommendations,
                status: ReportStatus::Complete,
            })
            .await
            .map_err(|e: StoreError| PipelineError::PersistenceFailed {
                file_url: file_url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            owner = %owner_id,
            report_id = %report.id,
            stage = "responded",
            "Analysis complete"
        );

        // Persisted → Responded.
        Ok(AnalysisResponse {
            report_id: report.id,
            file_url: report.file_url,
            glucose: report.extracted.glucose,
            hba1c: report.extracted.hba1c,
            recommendations: report.recommendations,
            status: report.status,
        })
    }

    /// The caller's reports, newest first.
    pub async fn history(&self, credential: Option<&str>) -> Result<Vec<crate::models::Report>, PipelineError> {
        let credential = credential.ok_or(PipelineError::Unauthenticated)?;
        let owner_id = self.verifier.verify(credential).await?;
        self.reports
            .list(&owner_id)
            .await
            .map_err(|e| PipelineError::StorageUnavailable(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::auth::TokenRegistry;
    use crate::db::open_memory_database;
    use crate::extract::EmbeddedTextRecognizer;
    use crate::models::ExtractedData;
    use crate::store::SqliteReportStore;

    // -- Mock collaborators ---------------------------------------------------

    /// Blob store that records invocations without storing anything.
    pub struct CountingBlobStore {
        pub puts: AtomicUsize,
        pub fail: bool,
    }

    impl CountingBlobStore {
        pub fn new() -> Self {
            Self {
                puts: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                puts: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl BlobStore for CountingBlobStore {
        async fn put(
            &self,
            owner_id: &str,
            _bytes: &[u8],
            _content_type: &str,
            original_name: &str,
        ) -> Result<String, StorageError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::Unavailable("bucket offline".into()));
            }
            Ok(format!(
                "http://localhost/files/reports/{owner_id}/{original_name}"
            ))
        }
    }

    /// Record store that counts creates and optionally fails them.
    pub struct CountingReportStore {
        pub creates: AtomicUsize,
        pub fail_create: bool,
    }

    impl CountingReportStore {
        pub fn new() -> Self {
            Self {
                creates: AtomicUsize::new(0),
                fail_create: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                creates: AtomicUsize::new(0),
                fail_create: true,
            }
        }
    }

    #[async_trait]
    impl ReportStore for CountingReportStore {
        async fn create(&self, new: NewReport) -> Result<crate::models::Report, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(StoreError::Unavailable("database offline".into()));
            }
            Ok(crate::models::Report {
                id: Uuid::new_v4(),
                owner_id: new.owner_id,
                file_url: new.file_url,
                extracted: new.extracted,
                recommendations: new.recommendations,
                status: new.status,
                created_at: chrono::Utc::now(),
            })
        }

        async fn list(&self, _owner_id: &str) -> Result<Vec<crate::models::Report>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Recognizer that always errors (simulates a corrupt/unreadable file).
    struct BrokenRecognizer;

    #[async_trait]
    impl TextRecognizer for BrokenRecognizer {
        async fn recognize(&self, _bytes: &[u8], _ct: &str) -> Result<String, ExtractError> {
            Err(ExtractError::Recognition("engine crashed".into()))
        }
    }

    fn allowed_types() -> Vec<String> {
        crate::config::ALLOWED_MIME_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn verifier() -> Arc<TokenRegistry> {
        Arc::new(TokenRegistry::new(&[(
            "alice".to_string(),
            "good-token".to_string(),
        )]))
    }

    fn pipeline_with(
        blobs: Arc<dyn BlobStore>,
        reports: Arc<dyn ReportStore>,
    ) -> AnalysisPipeline {
        AnalysisPipeline::new(
            verifier(),
            blobs,
            reports,
            Arc::new(EmbeddedTextRecognizer),
            Recommender::rule_based(),
            10 * 1024 * 1024,
            allowed_types(),
        )
    }

    fn pdf_upload(credential: Option<&str>) -> UploadRequest {
        UploadRequest {
            credential: credential.map(String::from),
            file: Some(UploadFile {
                bytes: b"%PDF-1.4\nGlucose: 110\nHbA1c: 5.9".to_vec(),
                declared_type: Some("application/pdf".to_string()),
                original_name: "report.pdf".to_string(),
            }),
            patient: PatientProfile {
                age: Some(30),
                weight_kg: Some(70.0),
                activity: crate::models::ActivityLevel::parse("moderate"),
                diet_restrictions: None,
            },
        }
    }

    // -- Authentication gate --------------------------------------------------

    #[tokio::test]
    async fn bad_credential_creates_nothing() {
        let blobs = Arc::new(CountingBlobStore::new());
        let reports = Arc::new(CountingReportStore::new());
        let pipeline = pipeline_with(blobs.clone(), reports.clone());

        let err = pipeline.run(pdf_upload(Some("wrong-token"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unauthenticated));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
        assert_eq!(reports.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credential_creates_nothing() {
        let blobs = Arc::new(CountingBlobStore::new());
        let reports = Arc::new(CountingReportStore::new());
        let pipeline = pipeline_with(blobs.clone(), reports.clone());

        let err = pipeline.run(pdf_upload(None)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unauthenticated));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
    }

    // -- Input validation before any store call -------------------------------

    #[tokio::test]
    async fn missing_file_rejected_before_store() {
        let blobs = Arc::new(CountingBlobStore::new());
        let pipeline = pipeline_with(blobs.clone(), Arc::new(CountingReportStore::new()));

        let mut request = pdf_upload(Some("good-token"));
        request.file = None;
        let err = pipeline.run(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disallowed_type_rejected_before_store() {
        let blobs = Arc::new(CountingBlobStore::new());
        let pipeline = pipeline_with(blobs.clone(), Arc::new(CountingReportStore::new()));

        let mut request = pdf_upload(Some("good-token"));
        request.file.as_mut().unwrap().declared_type = Some("image/gif".to_string());
        let err = pipeline.run(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMediaType(_)));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_file_rejected_before_store() {
        let blobs = Arc::new(CountingBlobStore::new());
        let pipeline = pipeline_with(blobs.clone(), Arc::new(CountingReportStore::new()));

        let mut request = pdf_upload(Some("good-token"));
        request.file.as_mut().unwrap().bytes = vec![b'a'; 10 * 1024 * 1024 + 1];
        let err = pipeline.run(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { .. }));
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
    }

    // -- Happy path -----------------------------------------------------------

    #[tokio::test]
    async fn successful_run_yields_complete_report() {
        let conn = open_memory_database().unwrap();
        let reports = Arc::new(SqliteReportStore::new(conn));
        let pipeline = pipeline_with(Arc::new(CountingBlobStore::new()), reports.clone());

        let response = pipeline.run(pdf_upload(Some("good-token"))).await.unwrap();
        assert_eq!(response.glucose, Some(110));
        assert_eq!(response.hba1c, Some(5.9));
        assert_eq!(response.status, ReportStatus::Complete);
        assert!(!response.file_url.is_empty());
        assert!(response.recommendations.contains("##"));

        let listed = reports.list("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, response.report_id);
    }

    #[tokio::test]
    async fn partial_extraction_still_completes() {
        let pipeline = pipeline_with(
            Arc::new(CountingBlobStore::new()),
            Arc::new(SqliteReportStore::new(open_memory_database().unwrap())),
        );

        let mut request = pdf_upload(Some("good-token"));
        request.file.as_mut().unwrap().bytes = b"%PDF-1.4\nGlucose: 110\nHbA1c pending".to_vec();
        let response = pipeline.run(request).await.unwrap();
        assert_eq!(response.glucose, Some(110));
        assert_eq!(response.hba1c, None);
        assert_eq!(response.status, ReportStatus::Complete);
        // Null HbA1c routes to the generic plan, still with headings.
        assert!(response.recommendations.contains("##"));
    }

    // -- Failure propagation --------------------------------------------------

    #[tokio::test]
    async fn storage_failure_is_surfaced() {
        let reports = Arc::new(CountingReportStore::new());
        let pipeline = pipeline_with(Arc::new(CountingBlobStore::failing()), reports.clone());

        let err = pipeline.run(pdf_upload(Some("good-token"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageUnavailable(_)));
        assert_eq!(reports.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recognizer_error_fails_without_record() {
        let reports = Arc::new(CountingReportStore::new());
        let pipeline = AnalysisPipeline::new(
            verifier(),
            Arc::new(CountingBlobStore::new()),
            reports.clone(),
            Arc::new(BrokenRecognizer),
            Recommender::rule_based(),
            10 * 1024 * 1024,
            allowed_types(),
        );

        let err = pipeline.run(pdf_upload(Some("good-token"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
        assert_eq!(reports.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistence_failure_reports_file_url() {
        let blobs = Arc::new(CountingBlobStore::new());
        let pipeline = pipeline_with(blobs.clone(), Arc::new(CountingReportStore::failing()));

        let err = pipeline.run(pdf_upload(Some("good-token"))).await.unwrap_err();
        match err {
            PipelineError::PersistenceFailed { file_url, .. } => {
                assert!(file_url.contains("reports/alice/"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Blob was stored before the record write failed.
        assert_eq!(blobs.puts.load(Ordering::SeqCst), 1);
    }

    // -- History --------------------------------------------------------------

    #[tokio::test]
    async fn history_requires_credential() {
        let pipeline = pipeline_with(
            Arc::new(CountingBlobStore::new()),
            Arc::new(CountingReportStore::new()),
        );
        assert!(matches!(
            pipeline.history(None).await,
            Err(PipelineError::Unauthenticated)
        ));
        assert!(matches!(
            pipeline.history(Some("wrong")).await,
            Err(PipelineError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn history_is_scoped_to_verified_owner() {
        let conn = open_memory_database().unwrap();
        let reports = Arc::new(SqliteReportStore::new(conn));
        reports
            .create(NewReport {
                owner_id: "alice".to_string(),
                file_url: "u1".to_string(),
                extracted: ExtractedData::default(),
                recommendations: String::new(),
                status: ReportStatus::Complete,
            })
            .await
            .unwrap();
        reports
            .create(NewReport {
                owner_id: "mallory".to_string(),
                file_url: "u2".to_string(),
                extracted: ExtractedData::default(),
                recommendations: String::new(),
                status: ReportStatus::Complete,
            })
            .await
            .unwrap();

        let pipeline = pipeline_with(Arc::new(CountingBlobStore::new()), reports);
        let history = pipeline.history(Some("good-token")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].owner_id, "alice");
    }
}
