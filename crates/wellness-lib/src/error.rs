//! Error taxonomy for derivation, validation and model evaluation

use crate::models::ModelId;
use serde_json::Value;
use thiserror::Error;

/// Request-level failures that abort a derivation or prediction request
#[derive(Debug, Error)]
pub enum WellnessError {
    /// Fewer than two usable cycles after normalization
    #[error("Insufficient cycle data: {cycles} usable cycle(s), at least 2 required")]
    InsufficientData { cycles: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Feature validation failures, always naming the offending field(s)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required features: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid type for feature '{field}': {value}")]
    InvalidType { field: String, value: Value },

    #[error("Feature '{field}' out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Unknown model selection: '{0}'")]
    UnknownModel(String),
}

impl ValidationError {
    /// Name of the single offending field, if the error concerns one
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidType { field, .. }
            | ValidationError::OutOfRange { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Per-model failures; these are reported alongside sibling results
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{model} model not loaded")]
    Unavailable { model: ModelId },

    #[error("{model} prediction failed: {message}")]
    Prediction { model: ModelId, message: String },
}
