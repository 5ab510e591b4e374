//! Core domain types: reports, extracted lab values, patient profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a report. Never regresses once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Complete,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Structured values recovered from the report text.
///
/// Each field is `None` when the label was absent or the following token
/// could not be parsed — partial extraction is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// Fasting glucose in mg/dL.
    pub glucose: Option<u32>,
    /// Glycated hemoglobin in percent.
    pub hba1c: Option<f64>,
}

/// One persisted analysis result, visible only to its owner.
///
/// Append-only once `status` reaches `complete` or `failed`; `id` and
/// `created_at` are assigned by the record store at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub owner_id: String,
    pub file_url: String,
    pub extracted: ExtractedData,
    pub recommendations: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Self-reported activity level from the patient form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sedentary => "sedentary",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sedentary" => Some(Self::Sedentary),
            "light" => Some(Self::Light),
            "moderate" => Some(Self::Moderate),
            "active" | "high" => Some(Self::Active),
            _ => None,
        }
    }
}

/// Request-scoped patient metadata. Input to the recommendation generator
/// only — never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientProfile {
    pub age: Option<u32>,
    pub weight_kg: Option<f64>,
    pub activity: Option<ActivityLevel>,
    pub diet_restrictions: Option<String>,
}

impl PatientProfile {
    /// Parse the `patientData` form field.
    ///
    /// The browser form submits every value as a JSON string ("30", "70"),
    /// so parsing is tolerant: numbers and numeric strings both work, and
    /// anything unparsable becomes `None` rather than rejecting the upload.
    pub fn parse(json: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };

        let age = number_field(&value, &["age"]).map(|n| n as u32);
        let weight_kg = number_field(&value, &["weight", "weightKg", "weight_kg"]);
        let activity = string_field(&value, &["activity", "activityLevel", "activity_level"])
            .and_then(|s| ActivityLevel::parse(&s));
        let diet_restrictions =
            string_field(&value, &["diet", "dietRestrictions", "diet_restrictions"])
                .filter(|s| !s.trim().is_empty());

        Self {
            age,
            weight_kg,
            activity,
            diet_restrictions,
        }
    }
}

fn number_field(value: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match value.get(key) {
            Some(serde_json::Value::Number(n)) => return n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                if let Ok(n) = s.trim().parse::<f64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

fn string_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(serde_json::Value::String(s)) = value.get(key) {
            return Some(s.clone());
        }
    }
    None
}
