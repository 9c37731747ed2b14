//! Human-readable interpretations attached to each model outcome

use crate::models::RiskLevel;

pub fn interpret_deviation(score: f64) -> &'static str {
    if score < 25.0 {
        "Excellent - Very close to healthy patterns"
    } else if score < 50.0 {
        "Good - Minor deviations from healthy patterns"
    } else if score < 75.0 {
        "Fair - Moderate deviations, monitoring recommended"
    } else {
        "Poor - Significant deviations, consultation advised"
    }
}

pub fn interpret_risk(level: Option<RiskLevel>) -> &'static str {
    match level {
        Some(RiskLevel::Low) => "Healthy menstrual patterns detected. Continue regular monitoring.",
        Some(RiskLevel::Medium) => {
            "Some irregularities detected. Consider lifestyle adjustments and monitoring."
        }
        Some(RiskLevel::High) => "Significant concerns detected. Medical consultation recommended.",
        None => "Unable to interpret risk level",
    }
}

pub fn interpret_prwi(score: f64) -> &'static str {
    if score <= 30.0 {
        "Low Risk - Healthy menstrual patterns"
    } else if score <= 60.0 {
        "Medium Risk - Some irregularities, monitoring recommended"
    } else {
        "High Risk - Significant concerns, medical consultation advised"
    }
}
