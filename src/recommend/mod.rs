//! Recommendation generation: rule-based plans with optional generative
//! delegation.
//!
//! The generative path is best-effort. Any failure falls back to the rule
//! table, so producing guidance never fails an otherwise-successful upload.

pub mod client;
pub mod prompt;
pub mod rules;

use std::sync::Arc;

pub use client::{GenerateError, GenerativeClient, TextGenerate};
pub use rules::{classify, rule_based_plan, RiskBand};

use crate::models::PatientProfile;

/// Produces formatted guidance text from patient + lab data.
///
/// With no generative client configured this is purely rule-based.
pub struct Recommender {
    generator: Option<Arc<dyn TextGenerate>>,
}

impl Recommender {
    pub fn rule_based() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn TextGenerate>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Generate guidance text. Infallible: generative failures degrade to
    /// the rule-based plan.
    pub async fn generate(
        &self,
        profile: &PatientProfile,
        glucose: Option<u32>,
        hba1c: Option<f64>,
        context_text: &str,
    ) -> String {
        if let Some(generator) = &self.generator {
            let user_prompt = prompt::build_guidance_prompt(profile, glucose, hba1c, context_text);
            match generator.generate(prompt::SYSTEM_PROMPT, &user_prompt).await {
                Ok(text) if !text.trim().is_empty() => return normalize_sections(text),
                Ok(_) => {
                    tracing::warn!("Generation service returned empty text, using rule-based plan");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Generation failed, using rule-based plan");
                }
            }
        }

        rule_based_plan(classify(hba1c), profile, glucose, hba1c)
    }
}

/// Guarantee at least one heading marker so both strategies render into the
/// same structural shape.
fn normalize_sections(text: String) -> String {
    if text.lines().any(|l| l.trim_start().starts_with('#')) {
        text
    } else {
        format!("## Recommendations\n\n{text}")
    }
}
