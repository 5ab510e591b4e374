//! Prompt construction for the generative guidance strategy.

use crate::models::PatientProfile;

pub const SYSTEM_PROMPT: &str = "You are a healthcare assistant producing \
lifestyle guidance from blood-report values. Format your entire output as \
clean Markdown with `##` section headings. Never invent lab values.";

/// Build the guidance prompt from patient profile, lab values and the
/// (already truncated) recognized report text.
pub fn build_guidance_prompt(
    profile: &PatientProfile,
    glucose: Option<u32>,
    hba1c: Option<f64>,
    context_text: &str,
) -> String {
    let age = profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let weight = profile
        .weight_kg
        .map(|w| format!("{w} kg"))
        .unwrap_or_else(|| "Unknown".to_string());
    let activity = profile
        .activity
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let diet = profile
        .diet_restrictions
        .clone()
        .unwrap_or_else(|| "None".to_string());
    let glucose = glucose
        .map(|g| format!("{g} mg/dL"))
        .unwrap_or_else(|| "not available".to_string());
    let hba1c = hba1c
        .map(|h| format!("{h} %"))
        .unwrap_or_else(|| "not available".to_string());

    format!(
        "Patient Data:\n\
         - Age: {age}\n\
         - Weight: {weight}\n\
         - Activity Level: {activity}\n\
         - Dietary Restrictions: {diet}\n\
         \n\
         Blood Report:\n\
         - Glucose: {glucose}\n\
         - HbA1c: {hba1c}\n\
         \n\
         Report Text:\n\
         {context_text}\n\
         \n\
         Tasks:\n\
         1. Assess diabetes risk (Normal / Pre-diabetic / Diabetic)\n\
         2. Create a practical 7-day diet plan respecting the restrictions\n\
         3. Suggest a safe workout routine for the stated activity level\n\
         4. Mention lifestyle changes\n\
         5. Add a medical disclaimer\n\
         \n\
         Format the output in clean Markdown with `##` headings."
    )
}
