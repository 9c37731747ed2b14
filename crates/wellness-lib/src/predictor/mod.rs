//! Model evaluation: model provider, fallback heuristics and the prediction chain

mod ensemble;
mod fallback;
mod inference;
mod interpret;
mod orchestrator;
mod registry;

pub use ensemble::{ClusterSignal, EnsembleFeatureVector, RiskSignal};
pub use fallback::{FallbackModel, FALLBACK_VERSION};
pub use inference::OnnxModel;
pub use interpret::{interpret_deviation, interpret_prwi, interpret_risk};
pub use orchestrator::{
    parse_model_selection, run_predictions, ClusterOutcome, ModelOutcome, PredictionBundle,
    PredictionOrchestrator, PrwiOutcome, RiskOutcome, RiskProbabilities,
};
pub use registry::{ModelRegistry, ModelSource};

use crate::error::ModelError;
use crate::models::features::*;
use crate::models::ModelId;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Input columns of the cluster deviation model
pub const CLUSTER_FEATURES: [&str; 10] = [
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
];

/// Input columns of the risk model, in training order
pub const RISK_FEATURES: [&str; 13] = [
    AVG_CYCLE_LENGTH,
    IRREGULAR_CYCLES_PERCENT,
    STD_CYCLE_LENGTH,
    AVG_LUTEAL_PHASE,
    SHORT_LUTEAL_PERCENT,
    AVG_BLEEDING_INTENSITY,
    UNUSUAL_BLEEDING_PERCENT,
    AVG_MENSES_LENGTH,
    AVG_OVULATION_DAY,
    OVULATION_VARIABILITY,
    AGE,
    BMI,
    TOTAL_CYCLES,
];

/// Input columns of the PRWI model: profile fields followed by the ensemble features
pub const PRWI_FEATURES: [&str; 17] = [
    AGE,
    BMI,
    NUMBER_PREGNANCIES,
    ABORTIONS,
    AGE_AT_MENARCHE,
    BREASTFEEDING,
    ensemble::RISK_PROB_LOW,
    ensemble::RISK_PROB_MEDIUM,
    ensemble::RISK_PROB_HIGH,
    ensemble::RISK_CLASS,
    ensemble::CLUSTER_DEV_SCORE,
    ensemble::CLUSTER_LABEL,
    ensemble::RISK_DEV_INTERACTION,
    ensemble::STABILITY_SCORE,
    ensemble::DATA_CONFIDENCE,
    ensemble::RISK_UNCERTAINTY,
    ensemble::CLUSTER_QUALITY,
];

/// Number of input columns a model expects
pub fn input_width(id: ModelId) -> usize {
    match id {
        ModelId::Cluster => CLUSTER_FEATURES.len(),
        ModelId::Risk => RISK_FEATURES.len(),
        ModelId::Prwi => PRWI_FEATURES.len(),
    }
}

/// A loaded, read-only model
pub trait Model: Send + Sync {
    /// Point prediction: class label for classifiers, score for regressors
    fn predict(&self, input: &[f32]) -> Result<f32>;

    /// Class probabilities in class order
    fn predict_proba(&self, input: &[f32]) -> Result<Vec<f32>>;

    /// Version string reported alongside every prediction
    fn version(&self) -> &str;
}

/// Load state of a model slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Trained model loaded from disk
    Loaded,
    /// Heuristic fallback standing in for a model that failed to load
    Degraded,
    Unavailable,
}

impl ModelStatus {
    pub fn is_available(&self) -> bool {
        !matches!(self, ModelStatus::Unavailable)
    }
}

/// Source of the three models consumed by the orchestrator
pub trait ModelProvider: Send + Sync {
    fn status(&self, id: ModelId) -> ModelStatus;

    fn model(&self, id: ModelId) -> Result<&dyn Model, ModelError>;
}
