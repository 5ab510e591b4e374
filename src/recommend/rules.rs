//! Rule-based guidance: HbA1c risk bands and canned multi-section plans.

use crate::models::{ActivityLevel, PatientProfile};

/// Diabetes risk classification by HbA1c percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    /// HbA1c below 5.7
    Normal,
    /// HbA1c 5.7 through 6.4
    PreDiabetic,
    /// HbA1c above 6.4
    Diabetic,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::PreDiabetic => "Pre-diabetic",
            Self::Diabetic => "Diabetic",
        }
    }
}

/// Classify an HbA1c reading. `None` when the value was not recoverable.
pub fn classify(hba1c: Option<f64>) -> Option<RiskBand> {
    let value = hba1c?;
    Some(if value < 5.7 {
        RiskBand::Normal
    } else if value <= 6.4 {
        RiskBand::PreDiabetic
    } else {
        RiskBand::Diabetic
    })
}

/// Build the canned plan for a risk band (or the insufficient-data plan).
///
/// All plans share the same section structure so downstream rendering is
/// strategy-agnostic: risk assessment, diet, exercise, monitoring,
/// disclaimer — each under a `##` heading.
pub fn rule_based_plan(
    band: Option<RiskBand>,
    profile: &PatientProfile,
    glucose: Option<u32>,
    hba1c: Option<f64>,
) -> String {
    let mut plan = String::new();

    plan.push_str("## Risk Assessment\n");
    match band {
        Some(band) => {
            plan.push_str(&format!("- Classification: {}\n", band.as_str()));
            if let Some(h) = hba1c {
                plan.push_str(&format!("- HbA1c: {h} %\n"));
            }
            if let Some(g) = glucose {
                plan.push_str(&format!("- Glucose: {g} mg/dL\n"));
            }
        }
        None => {
            plan.push_str(
                "- Insufficient data: HbA1c could not be read from this report.\n\
                 - Please upload a clearer copy or a report that includes HbA1c.\n",
            );
        }
    }

    plan.push_str("\n## Diet Plan\n");
    match band {
        Some(RiskBand::Normal) | None => {
            plan.push_str("- Maintain a balanced diet with whole grains and vegetables\n");
            plan.push_str("- Keep added sugar occasional\n");
        }
        Some(RiskBand::PreDiabetic) => {
            plan.push_str("- Reduce sugar intake\n");
            plan.push_str("- Eat whole grains\n");
            plan.push_str("- Prefer low-glycemic carbohydrates\n");
        }
        Some(RiskBand::Diabetic) => {
            plan.push_str("- Eliminate sugary drinks and sweets\n");
            plan.push_str("- Portion-controlled, low-glycemic meals\n");
            plan.push_str("- Discuss a dietician referral with your doctor\n");
        }
    }
    if let Some(diet) = &profile.diet_restrictions {
        plan.push_str(&format!("- Within your stated restrictions: {diet}\n"));
    }

    plan.push_str("\n## Exercise\n");
    match profile.activity {
        Some(ActivityLevel::Sedentary) | None => {
            plan.push_str("- Start with a 30 minute daily walk\n- Light yoga or stretching\n");
        }
        Some(ActivityLevel::Light) => {
            plan.push_str("- Walk 30 minutes daily\n- Add two light strength sessions per week\n");
        }
        Some(ActivityLevel::Moderate) | Some(ActivityLevel::Active) => {
            plan.push_str("- Keep your current routine\n- Include two strength sessions per week\n");
        }
    }

    plan.push_str("\n## Monitoring\n");
    match band {
        Some(RiskBand::Diabetic) => {
            plan.push_str("- Monitor glucose as advised by your doctor\n- Re-test HbA1c in 3 months\n");
        }
        Some(RiskBand::PreDiabetic) => {
            plan.push_str("- Monitor glucose weekly\n- Re-test HbA1c in 6 months\n");
        }
        Some(RiskBand::Normal) | None => {
            plan.push_str("- Annual blood work is sufficient\n");
        }
    }

    plan.push_str(
        "\n## Disclaimer\nThis summary is informational and not medical advice. \
         Always consult a qualified healthcare professional.\n",
    );

    plan
}
