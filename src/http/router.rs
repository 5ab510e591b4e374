//! HTTP router assembly.
//!
//! Returns a composable `Router`: handlers receive `AppContext` via state,
//! stored files are served under `/files/`, and CORS is permissive (the
//! browser client is served from a different origin).

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::handlers;
use crate::pipeline::AnalysisPipeline;

/// Multipart framing overhead allowed on top of the file-size limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<AnalysisPipeline>,
}

/// Build the application router.
///
/// `files_root` mounts `/files/` for artifact retrieval when the local blob
/// store is in use; pass `None` when blobs live elsewhere.
pub fn build_router(
    pipeline: Arc<AnalysisPipeline>,
    files_root: Option<PathBuf>,
    max_upload_bytes: u64,
) -> Router {
    let ctx = AppContext { pipeline };

    let mut router = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/history", get(handlers::history))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(
            (max_upload_bytes + MULTIPART_OVERHEAD_BYTES) as usize,
        ))
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    if let Some(root) = files_root {
        router = router.nest_service("/files", ServeDir::new(root));
    }

    router
}
