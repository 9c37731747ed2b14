//! Cycle processing: normalization, metric derivation and feature assembly

pub mod derive;
pub mod normalize;

pub use derive::{
    cycle_health_score, derive, CycleMetrics, DerivationParams, MetricDeriver,
    HEAVY_INTENSITY, UNUSUAL_MENSES_DAYS,
};
pub use normalize::{
    days_between, normalize, normalize_with_limit, parse_calendar_date, NormalizedCycle,
    NormalizedCycleSet, MAX_CYCLES, MIN_CYCLES,
};

use crate::error::WellnessError;
use crate::models::features::PROFILE;
use crate::models::{CanonicalFeatureVector, CycleRecord};
use crate::validation::{sanitize, validate};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Result of turning a profile plus cycle history into model-ready features
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub features: CanonicalFeatureVector,
    pub metrics: CycleMetrics,
    pub health_score: u8,
}

/// Normalize, derive, merge the profile fields, sanitize and strictly validate
///
/// Only the six profile fields are read from `profile`; every cycle statistic
/// comes from the records so that a client cannot override derived values.
pub fn derive_features(
    profile: &Map<String, Value>,
    records: &[CycleRecord],
    params: &DerivationParams,
) -> Result<DerivedFeatures, WellnessError> {
    let set = normalize_with_limit(records, params.max_cycles)?;
    let metrics = MetricDeriver::with_params(params.clone()).derive(&set)?;

    let mut merged = metrics.to_feature_map();
    for name in PROFILE {
        if let Some(value) = profile.get(name) {
            merged.insert(name.to_string(), value.clone());
        }
    }

    let features = validate(&sanitize(&merged))?;
    let health_score = cycle_health_score(&metrics);
    debug!(
        cycles = metrics.total_cycles,
        health_score, "Derived canonical features"
    );

    Ok(DerivedFeatures {
        features,
        metrics,
        health_score,
    })
}
