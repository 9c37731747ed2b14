//! Features passed from the cluster and risk models into the PRWI model

use crate::models::CanonicalFeatureVector;
use serde::{Deserialize, Serialize};

pub const RISK_PROB_LOW: &str = "risk_prob_low";
pub const RISK_PROB_MEDIUM: &str = "risk_prob_medium";
pub const RISK_PROB_HIGH: &str = "risk_prob_high";
pub const RISK_CLASS: &str = "risk_class";
pub const CLUSTER_DEV_SCORE: &str = "clusterDev_score";
pub const CLUSTER_LABEL: &str = "cluster_label";
pub const RISK_DEV_INTERACTION: &str = "risk_dev_interaction";
pub const STABILITY_SCORE: &str = "stability_score";
pub const DATA_CONFIDENCE: &str = "data_confidence";
pub const RISK_UNCERTAINTY: &str = "risk_uncertainty";
pub const CLUSTER_QUALITY: &str = "cluster_quality";

const DEFAULT_DATA_CONFIDENCE: f64 = 0.8;
const DEFAULT_CLUSTER_QUALITY: f64 = 0.7;

/// Upstream output of the risk model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSignal {
    pub prob_low: f64,
    pub prob_medium: f64,
    pub prob_high: f64,
    pub class: u8,
}

impl Default for RiskSignal {
    /// Near-uniform prior used when the risk model produced nothing
    fn default() -> Self {
        Self {
            prob_low: 0.34,
            prob_medium: 0.33,
            prob_high: 0.33,
            class: 1,
        }
    }
}

/// Upstream output of the cluster model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSignal {
    pub deviation_score: f64,
    pub label: i64,
}

impl Default for ClusterSignal {
    fn default() -> Self {
        Self {
            deviation_score: 50.0,
            label: 0,
        }
    }
}

/// The eleven derived inputs of the PRWI model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleFeatureVector {
    pub risk_prob_low: f64,
    pub risk_prob_medium: f64,
    pub risk_prob_high: f64,
    pub risk_class: u8,
    #[serde(rename = "clusterDev_score")]
    pub cluster_dev_score: f64,
    pub cluster_label: i64,
    pub risk_dev_interaction: f64,
    pub stability_score: f64,
    pub data_confidence: f64,
    pub risk_uncertainty: f64,
    pub cluster_quality: f64,
}

impl EnsembleFeatureVector {
    /// Combine upstream signals, substituting defaults for any that are missing
    pub fn from_signals(risk: Option<RiskSignal>, cluster: Option<ClusterSignal>) -> Self {
        let risk = risk.unwrap_or_default();
        let cluster = cluster.unwrap_or_default();

        let probs = [risk.prob_low, risk.prob_medium, risk.prob_high];
        let max = probs.iter().copied().fold(f64::MIN, f64::max);
        let min = probs.iter().copied().fold(f64::MAX, f64::min);

        Self {
            risk_prob_low: risk.prob_low,
            risk_prob_medium: risk.prob_medium,
            risk_prob_high: risk.prob_high,
            risk_class: risk.class,
            cluster_dev_score: cluster.deviation_score,
            cluster_label: cluster.label,
            risk_dev_interaction: risk.prob_high * cluster.deviation_score / 100.0,
            stability_score: 100.0 - cluster.deviation_score,
            data_confidence: DEFAULT_DATA_CONFIDENCE,
            risk_uncertainty: max - min,
            cluster_quality: DEFAULT_CLUSTER_QUALITY,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            RISK_PROB_LOW => self.risk_prob_low,
            RISK_PROB_MEDIUM => self.risk_prob_medium,
            RISK_PROB_HIGH => self.risk_prob_high,
            RISK_CLASS => self.risk_class as f64,
            CLUSTER_DEV_SCORE => self.cluster_dev_score,
            CLUSTER_LABEL => self.cluster_label as f64,
            RISK_DEV_INTERACTION => self.risk_dev_interaction,
            STABILITY_SCORE => self.stability_score,
            DATA_CONFIDENCE => self.data_confidence,
            RISK_UNCERTAINTY => self.risk_uncertainty,
            CLUSTER_QUALITY => self.cluster_quality,
            _ => return None,
        };
        Some(value)
    }

    /// Build a PRWI input row; ensemble names resolve before canonical ones
    pub fn model_input(&self, features: &CanonicalFeatureVector, columns: &[&str]) -> Vec<f32> {
        columns
            .iter()
            .map(|name| {
                self.get(name)
                    .or_else(|| features.get(name))
                    .unwrap_or(0.0) as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_upstream_missing() {
        let e = EnsembleFeatureVector::from_signals(None, None);
        assert_eq!(e.risk_prob_high, 0.33);
        assert_eq!(e.risk_prob_medium, 0.33);
        assert_eq!(e.risk_prob_low, 0.34);
        assert_eq!(e.risk_class, 1);
        assert_eq!(e.cluster_dev_score, 50.0);
        assert_eq!(e.cluster_label, 0);
        assert_eq!(e.stability_score, 50.0);
        assert!((e.risk_dev_interaction - 0.165).abs() < 1e-9);
        assert!((e.risk_uncertainty - 0.01).abs() < 1e-9);
        assert_eq!(e.data_confidence, 0.8);
        assert_eq!(e.cluster_quality, 0.7);
    }

    #[test]
    fn test_derived_from_upstream_signals() {
        let risk = RiskSignal {
            prob_low: 0.1,
            prob_medium: 0.2,
            prob_high: 0.7,
            class: 2,
        };
        let cluster = ClusterSignal {
            deviation_score: 80.0,
            label: 3,
        };
        let e = EnsembleFeatureVector::from_signals(Some(risk), Some(cluster));
        assert!((e.risk_dev_interaction - 0.56).abs() < 1e-9);
        assert_eq!(e.stability_score, 20.0);
        assert!((e.risk_uncertainty - 0.6).abs() < 1e-9);
        assert_eq!(e.get(RISK_CLASS), Some(2.0));
        assert_eq!(e.get(CLUSTER_LABEL), Some(3.0));
    }

    #[test]
    fn test_wire_names() {
        let e = EnsembleFeatureVector::from_signals(None, None);
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["clusterDev_score"], 50.0);
        assert_eq!(value["risk_class"], 1);
    }
}
