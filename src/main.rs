use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use labsight::auth::TokenRegistry;
use labsight::config::{AppConfig, GeneratorConfig, ALLOWED_MIME_TYPES};
use labsight::db::sqlite::open_database;
use labsight::extract::{EmbeddedTextRecognizer, RemoteOcrClient, TextRecognizer};
use labsight::http::build_router;
use labsight::pipeline::AnalysisPipeline;
use labsight::recommend::{GenerativeClient, Recommender};
use labsight::storage::LocalBlobStore;
use labsight::store::SqliteReportStore;

const HTTP_TIMEOUT_SECS: u64 = 120;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(labsight::config::default_log_filter())),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let blobs_dir = config.blobs_dir();
    tokio::fs::create_dir_all(&blobs_dir).await?;

    let conn = open_database(&config.database_path())?;
    tracing::info!(path = %config.database_path().display(), "Database ready");

    let verifier = Arc::new(TokenRegistry::new(&config.api_tokens));
    let blobs = Arc::new(LocalBlobStore::new(
        blobs_dir.clone(),
        &config.public_base_url,
    ));
    let reports = Arc::new(SqliteReportStore::new(conn));

    let recognizer: Arc<dyn TextRecognizer> = match &config.ocr_url {
        Some(url) => {
            tracing::info!(url = %url, model = %config.ocr_model, "Using remote OCR");
            Arc::new(RemoteOcrClient::new(url, &config.ocr_model, HTTP_TIMEOUT_SECS))
        }
        None => Arc::new(EmbeddedTextRecognizer),
    };

    let recommender = match &config.generator {
        GeneratorConfig::RuleBased => Recommender::rule_based(),
        GeneratorConfig::Generative {
            base_url,
            model,
            api_key,
        } => {
            tracing::info!(url = %base_url, model = %model, "Using generative recommendations");
            Recommender::with_generator(Arc::new(GenerativeClient::new(
                base_url,
                model,
                api_key.clone(),
                HTTP_TIMEOUT_SECS,
            )))
        }
    };

    let pipeline = Arc::new(AnalysisPipeline::new(
        verifier,
        blobs,
        reports,
        recognizer,
        recommender,
        config.max_upload_bytes,
        ALLOWED_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
    ));

    let app = build_router(pipeline, Some(blobs_dir), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Labsight server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
