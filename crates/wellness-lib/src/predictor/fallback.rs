//! Heuristic stand-ins used when a trained model cannot be loaded
//!
//! Each heuristic reads its input row in the same column order as the trained
//! model it replaces, so the orchestrator treats both identically.

use super::{input_width, Model};
use crate::models::ModelId;
use anyhow::Result;

/// Version reported by every fallback prediction
pub const FALLBACK_VERSION: &str = "fallback";

/// Healthy reference value and tolerance per cluster column
const CLUSTER_NORMS: [(f32, f32); 10] = [
    (28.0, 7.0),  // AvgCycleLength
    (2.0, 5.0),   // StdCycleLength
    (0.0, 50.0),  // IrregularCyclesPercent
    (14.0, 4.0),  // AvgLutealPhase
    (0.0, 50.0),  // ShortLutealPercent
    (5.0, 3.0),   // AvgMensesLength
    (0.0, 50.0),  // UnusualBleedingPercent
    (14.0, 7.0),  // AvgOvulationDay
    (2.0, 5.0),   // OvulationVariability
    (3.0, 2.0),   // AvgBleedingIntensity
];

// Risk column positions
const RISK_IRREGULAR: usize = 1;
const RISK_SHORT_LUTEAL: usize = 4;
const RISK_UNUSUAL: usize = 6;

// PRWI column positions
const PRWI_PROB_MEDIUM: usize = 7;
const PRWI_PROB_HIGH: usize = 8;
const PRWI_CLUSTER_DEV: usize = 10;

/// Weight of the risk-probability score in the fallback wellness index
const PRWI_RISK_WEIGHT: f32 = 0.6;
const PRWI_DEVIATION_WEIGHT: f32 = 0.4;

/// Rule-based model for one model slot
#[derive(Debug, Clone, Copy)]
pub struct FallbackModel {
    id: ModelId,
}

impl FallbackModel {
    pub fn new(id: ModelId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    fn check_width(&self, input: &[f32]) -> Result<()> {
        let expected = input_width(self.id);
        if input.len() != expected {
            anyhow::bail!(
                "{} fallback expects {} values, got {}",
                self.id,
                expected,
                input.len()
            );
        }
        Ok(())
    }

    /// Mean normalized distance from healthy cycle norms, in [0, 1]
    fn cluster_deviation(input: &[f32]) -> f32 {
        let total: f32 = input
            .iter()
            .zip(CLUSTER_NORMS.iter())
            .map(|(value, (norm, tolerance))| ((value - norm).abs() / tolerance).min(1.0))
            .sum();
        total / CLUSTER_NORMS.len() as f32
    }

    /// Combined irregularity, bleeding and luteal signal, in [0, 1]
    fn risk_signal(input: &[f32]) -> f32 {
        let signal = 0.4 * input[RISK_IRREGULAR] / 100.0
            + 0.3 * input[RISK_UNUSUAL] / 100.0
            + 0.3 * input[RISK_SHORT_LUTEAL] / 100.0;
        signal.clamp(0.0, 1.0)
    }

    fn risk_probabilities(input: &[f32]) -> Vec<f32> {
        let s = Self::risk_signal(input);
        vec![(1.0 - s).powi(2), 2.0 * s * (1.0 - s), s.powi(2)]
    }

    fn prwi_score(input: &[f32]) -> f32 {
        let risk_score = input[PRWI_PROB_HIGH] * 100.0 + input[PRWI_PROB_MEDIUM] * 50.0;
        let score =
            PRWI_RISK_WEIGHT * risk_score + PRWI_DEVIATION_WEIGHT * input[PRWI_CLUSTER_DEV];
        score.clamp(0.0, 100.0)
    }
}

impl Model for FallbackModel {
    fn predict(&self, input: &[f32]) -> Result<f32> {
        self.check_width(input)?;
        let value = match self.id {
            ModelId::Cluster => {
                if Self::cluster_deviation(input) >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ModelId::Risk => argmax(&Self::risk_probabilities(input)) as f32,
            ModelId::Prwi => Self::prwi_score(input),
        };
        Ok(value)
    }

    /// The cluster heuristic reports a single probability equal to its
    /// normalized deviation, so its deviation score tracks distance from the
    /// healthy norms.
    fn predict_proba(&self, input: &[f32]) -> Result<Vec<f32>> {
        self.check_width(input)?;
        match self.id {
            ModelId::Cluster => Ok(vec![Self::cluster_deviation(input)]),
            ModelId::Risk => Ok(Self::risk_probabilities(input)),
            ModelId::Prwi => anyhow::bail!("prwi_score is a regressor without class probabilities"),
        }
    }

    fn version(&self) -> &str {
        FALLBACK_VERSION
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
