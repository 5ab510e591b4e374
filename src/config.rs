//! Environment-driven server configuration.
//!
//! Everything the server needs is resolved once at startup. Missing required
//! configuration aborts startup rather than proceeding with a degraded mock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const APP_NAME: &str = "Labsight";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload ceiling: 10 MiB per report file.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types accepted for report uploads.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How recommendation text is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorConfig {
    /// Canned band-specific plans, no external calls.
    RuleBased,
    /// Delegate to a generative text service; falls back to rules on failure.
    Generative {
        base_url: String,
        model: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Base URL under which stored files are retrievable.
    pub public_base_url: String,
    pub max_upload_bytes: u64,
    /// `(user_id, bearer_token)` pairs seeded into the token registry.
    pub api_tokens: Vec<(String, String)>,
    pub generator: GeneratorConfig,
    /// Optional remote OCR endpoint; embedded text extraction when unset.
    pub ocr_url: Option<String>,
    pub ocr_model: String,
}

impl AppConfig {
    /// Load configuration from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Core loader, separated from process env so tests stay hermetic.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = vars
            .get("LABSIGHT_BIND_ADDR")
            .map(String::as_str)
            .unwrap_or("127.0.0.1:8787")
            .parse()
            .map_err(|e| ConfigError::Invalid {
                name: "LABSIGHT_BIND_ADDR",
                reason: format!("{e}"),
            })?;

        let data_dir = match vars.get("LABSIGHT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };

        let public_base_url = vars
            .get("LABSIGHT_PUBLIC_URL")
            .cloned()
            .unwrap_or_else(|| format!("http://{bind_addr}"))
            .trim_end_matches('/')
            .to_string();

        let max_upload_bytes = match vars.get("LABSIGHT_MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                name: "LABSIGHT_MAX_UPLOAD_BYTES",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let api_tokens = parse_api_tokens(
            vars.get("LABSIGHT_API_TOKENS")
                .ok_or(ConfigError::Missing("LABSIGHT_API_TOKENS"))?,
        )?;

        let generator = match vars.get("LABSIGHT_GENERATOR").map(String::as_str) {
            None | Some("rules") => GeneratorConfig::RuleBased,
            Some("llm") => GeneratorConfig::Generative {
                base_url: vars
                    .get("LABSIGHT_LLM_URL")
                    .ok_or(ConfigError::Missing("LABSIGHT_LLM_URL"))?
                    .trim_end_matches('/')
                    .to_string(),
                model: vars
                    .get("LABSIGHT_LLM_MODEL")
                    .ok_or(ConfigError::Missing("LABSIGHT_LLM_MODEL"))?
                    .clone(),
                api_key: vars.get("LABSIGHT_LLM_API_KEY").cloned(),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LABSIGHT_GENERATOR",
                    reason: format!("expected 'rules' or 'llm', got '{other}'"),
                })
            }
        };

        let ocr_url = vars
            .get("LABSIGHT_OCR_URL")
            .map(|u| u.trim_end_matches('/').to_string());
        let ocr_model = vars
            .get("LABSIGHT_OCR_MODEL")
            .cloned()
            .unwrap_or_else(|| "medgemma".to_string());

        Ok(Self {
            bind_addr,
            data_dir,
            public_base_url,
            max_upload_bytes,
            api_tokens,
            generator,
            ocr_url,
            ocr_model,
        })
    }

    /// Directory where uploaded report files are stored.
    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("labsight.db")
    }
}

/// `~/Labsight` on all platforms (user-visible).
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,labsight=debug".to_string()
}

/// Parse `user=token` pairs separated by commas.
fn parse_api_tokens(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let (user, token) = entry.split_once('=').ok_or_else(|| ConfigError::Invalid {
            name: "LABSIGHT_API_TOKENS",
            reason: format!("expected 'user=token', got '{entry}'"),
        })?;
        let (user, token) = (user.trim(), token.trim());
        if user.is_empty() || token.is_empty() {
            return Err(ConfigError::Invalid {
                name: "LABSIGHT_API_TOKENS",
                reason: "empty user or token".to_string(),
            });
        }
        pairs.push((user.to_string(), token.to_string()));
    }
    if pairs.is_empty() {
        return Err(ConfigError::Invalid {
            name: "LABSIGHT_API_TOKENS",
            reason: "at least one user=token pair is required".to_string(),
        });
    }
    Ok(pairs)
}
