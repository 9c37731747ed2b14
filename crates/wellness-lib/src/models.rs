//! Core data models for the wellness inference service

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Canonical feature names shared by the whole pipeline
pub mod features {
    pub const AVG_CYCLE_LENGTH: &str = "AvgCycleLength";
    pub const AVG_CYCLE_LENGTH_PERCENT: &str = "AvgCycleLengthPercent";
    pub const STD_CYCLE_LENGTH: &str = "StdCycleLength";
    pub const IRREGULAR_CYCLES_PERCENT: &str = "IrregularCyclesPercent";
    pub const AVG_LUTEAL_PHASE: &str = "AvgLutealPhase";
    pub const SHORT_LUTEAL_PERCENT: &str = "ShortLutealPercent";
    pub const AVG_MENSES_LENGTH: &str = "AvgMensesLength";
    pub const UNUSUAL_BLEEDING_PERCENT: &str = "UnusualBleedingPercent";
    pub const AVG_OVULATION_DAY: &str = "AvgOvulationDay";
    pub const OVULATION_VARIABILITY: &str = "OvulationVariability";
    pub const AVG_BLEEDING_INTENSITY: &str = "AvgBleedingIntensity";
    pub const AGE: &str = "Age";
    pub const BMI: &str = "BMI";
    pub const TOTAL_CYCLES: &str = "TotalCycles";
    pub const NUMBER_PREGNANCIES: &str = "Numberpreg";
    pub const ABORTIONS: &str = "Abortions";
    pub const AGE_AT_MENARCHE: &str = "AgeM";
    pub const BREASTFEEDING: &str = "Breastfeeding";

    /// The seventeen fields every strict validation requires
    pub const CANONICAL: [&str; 17] = [
        AVG_CYCLE_LENGTH,
        STD_CYCLE_LENGTH,
        IRREGULAR_CYCLES_PERCENT,
        AVG_LUTEAL_PHASE,
        SHORT_LUTEAL_PERCENT,
        AVG_MENSES_LENGTH,
        UNUSUAL_BLEEDING_PERCENT,
        AVG_OVULATION_DAY,
        OVULATION_VARIABILITY,
        AVG_BLEEDING_INTENSITY,
        AGE,
        BMI,
        TOTAL_CYCLES,
        NUMBER_PREGNANCIES,
        ABORTIONS,
        AGE_AT_MENARCHE,
        BREASTFEEDING,
    ];

    /// Fields taken from the user profile rather than derived from cycles
    pub const PROFILE: [&str; 6] = [
        AGE,
        BMI,
        NUMBER_PREGNANCIES,
        ABORTIONS,
        AGE_AT_MENARCHE,
        BREASTFEEDING,
    ];
}

/// One user-reported menstrual cycle as received from a client
///
/// Dates stay as strings until normalization so that malformed entries can be
/// dropped instead of failing the whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    #[serde(default, alias = "start", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, alias = "end", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Bleeding intensity on a 1-5 scale
    #[serde(
        default,
        deserialize_with = "deserialize_intensity",
        skip_serializing_if = "Option::is_none"
    )]
    pub intensity: Option<u8>,
    #[serde(default, alias = "month", skip_serializing_if = "Option::is_none")]
    pub month_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CycleRecord {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: Some(start_date.into()),
            end_date: Some(end_date.into()),
            ..Default::default()
        }
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_month_key(mut self, month_key: impl Into<String>) -> Self {
        self.month_key = Some(month_key.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    /// The client-supplied `monthKey`, ignoring blanks; normalization falls
    /// back to the parsed start date's `YYYY-MM`
    pub fn explicit_month_key(&self) -> Option<&str> {
        self.month_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Timestamp used to pick the surviving record among same-month duplicates
    pub fn revision(&self) -> &str {
        self.updated_at
            .as_deref()
            .or(self.created_at.as_deref())
            .unwrap_or("")
    }
}

/// Accepts a number or numeric string in 1..=5; anything else is treated as absent
fn deserialize_intensity<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let numeric = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(numeric
        .filter(|v| v.fract() == 0.0 && (1.0..=5.0).contains(v))
        .map(|v| v as u8))
}

/// Validated feature set consumed by every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFeatureVector {
    #[serde(rename = "AvgCycleLength")]
    pub avg_cycle_length: f64,
    #[serde(rename = "StdCycleLength")]
    pub std_cycle_length: f64,
    #[serde(rename = "IrregularCyclesPercent")]
    pub irregular_cycles_percent: f64,
    #[serde(rename = "AvgLutealPhase")]
    pub avg_luteal_phase: f64,
    #[serde(rename = "ShortLutealPercent")]
    pub short_luteal_percent: f64,
    #[serde(rename = "AvgMensesLength")]
    pub avg_menses_length: f64,
    #[serde(rename = "UnusualBleedingPercent")]
    pub unusual_bleeding_percent: f64,
    #[serde(rename = "AvgOvulationDay")]
    pub avg_ovulation_day: f64,
    #[serde(rename = "OvulationVariability")]
    pub ovulation_variability: f64,
    #[serde(rename = "AvgBleedingIntensity")]
    pub avg_bleeding_intensity: f64,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "TotalCycles")]
    pub total_cycles: u32,
    #[serde(rename = "Numberpreg")]
    pub number_pregnancies: u32,
    #[serde(rename = "Abortions")]
    pub abortions: u32,
    #[serde(rename = "AgeM")]
    pub age_at_menarche: u32,
    #[serde(rename = "Breastfeeding")]
    pub breastfeeding: u8,
    /// Only present when the vector was derived from cycle records
    #[serde(
        rename = "AvgCycleLengthPercent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avg_cycle_length_percent: Option<f64>,
}

impl CanonicalFeatureVector {
    /// Look up a feature by its canonical name
    pub fn get(&self, name: &str) -> Option<f64> {
        use features::*;
        let value = match name {
            AVG_CYCLE_LENGTH => self.avg_cycle_length,
            STD_CYCLE_LENGTH => self.std_cycle_length,
            IRREGULAR_CYCLES_PERCENT => self.irregular_cycles_percent,
            AVG_LUTEAL_PHASE => self.avg_luteal_phase,
            SHORT_LUTEAL_PERCENT => self.short_luteal_percent,
            AVG_MENSES_LENGTH => self.avg_menses_length,
            UNUSUAL_BLEEDING_PERCENT => self.unusual_bleeding_percent,
            AVG_OVULATION_DAY => self.avg_ovulation_day,
            OVULATION_VARIABILITY => self.ovulation_variability,
            AVG_BLEEDING_INTENSITY => self.avg_bleeding_intensity,
            AGE => self.age as f64,
            BMI => self.bmi,
            TOTAL_CYCLES => self.total_cycles as f64,
            NUMBER_PREGNANCIES => self.number_pregnancies as f64,
            ABORTIONS => self.abortions as f64,
            AGE_AT_MENARCHE => self.age_at_menarche as f64,
            BREASTFEEDING => self.breastfeeding as f64,
            AVG_CYCLE_LENGTH_PERCENT => return self.avg_cycle_length_percent,
            _ => return None,
        };
        Some(value)
    }

    /// Build a model input row in the given column order; unknown columns are zero
    pub fn model_input(&self, columns: &[&str]) -> Vec<f32> {
        columns
            .iter()
            .map(|name| self.get(name).unwrap_or(0.0) as f32)
            .collect()
    }
}

/// Identifier of one of the three pre-trained models
///
/// Ordering places the upstream models before the wellness index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "clusterdev")]
    Cluster,
    #[serde(rename = "risk_assessment")]
    Risk,
    #[serde(rename = "prwi_score")]
    Prwi,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [ModelId::Cluster, ModelId::Risk, ModelId::Prwi];

    /// Key used for this model in result bundles and health reports
    pub fn key(&self) -> &'static str {
        match self {
            ModelId::Cluster => "clusterdev",
            ModelId::Risk => "risk_assessment",
            ModelId::Prwi => "prwi_score",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clusterdev" | "cluster" | "cluster_deviation" => Ok(ModelId::Cluster),
            "risk" | "risk_assessment" => Ok(ModelId::Risk),
            "prwi" | "prwi_score" => Ok(ModelId::Prwi),
            other => Err(other.to_string()),
        }
    }
}

/// Risk class taxonomy produced by the risk model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_class(class: i64) -> Option<Self> {
        match class {
            0 => Some(RiskLevel::Low),
            1 => Some(RiskLevel::Medium),
            2 => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn class(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}
