//! Prediction orchestration
//!
//! Runs the requested models against one canonical feature vector. The risk
//! and cluster models always run before the wellness index, whose input row is
//! synthesized from their outputs. Each model's failure is captured in its own
//! bundle entry and never aborts its siblings.

use super::ensemble::{ClusterSignal, EnsembleFeatureVector, RiskSignal};
use super::interpret::{interpret_deviation, interpret_prwi, interpret_risk};
use super::{ModelProvider, ModelStatus, CLUSTER_FEATURES, PRWI_FEATURES, RISK_FEATURES};
use crate::error::{ModelError, ValidationError, WellnessError};
use crate::models::{CanonicalFeatureVector, ModelId, RiskLevel};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::validation::{sanitize, validate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Instant;

/// Success payload or `{ "error": message }` for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelOutcome<T> {
    Success(T),
    Failure { error: String },
}

impl<T> ModelOutcome<T> {
    pub fn success(&self) -> Option<&T> {
        match self {
            ModelOutcome::Success(value) => Some(value),
            ModelOutcome::Failure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModelOutcome::Failure { .. })
    }
}

impl<T> From<Result<T, ModelError>> for ModelOutcome<T> {
    fn from(result: Result<T, ModelError>) -> Self {
        match result {
            Ok(value) => ModelOutcome::Success(value),
            Err(e) => ModelOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterOutcome {
    pub cluster: i64,
    pub deviation_score: f64,
    pub interpretation: String,
    pub degraded: bool,
    pub model_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProbabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOutcome {
    /// "Low", "Medium", "High", or "Unknown" for a class outside the taxonomy
    pub risk_level: String,
    pub risk_class: i64,
    pub probabilities: RiskProbabilities,
    pub interpretation: String,
    pub degraded: bool,
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrwiOutcome {
    pub prwi_score: f64,
    pub interpretation: String,
    /// Inputs synthesized from the upstream models
    pub ensemble_features: EnsembleFeatureVector,
    pub degraded: bool,
    pub model_version: String,
}

/// Outcomes keyed by model; only requested models are present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusterdev: Option<ModelOutcome<ClusterOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<ModelOutcome<RiskOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prwi_score: Option<ModelOutcome<PrwiOutcome>>,
}

impl PredictionBundle {
    /// Number of entries reporting an error
    pub fn failures(&self) -> usize {
        [
            self.clusterdev.as_ref().map(ModelOutcome::is_failure),
            self.risk_assessment.as_ref().map(ModelOutcome::is_failure),
            self.prwi_score.as_ref().map(ModelOutcome::is_failure),
        ]
        .into_iter()
        .flatten()
        .filter(|failed| *failed)
        .count()
    }
}

/// Parse a model selection; empty or containing "all" selects every model
pub fn parse_model_selection<S: AsRef<str>>(
    names: &[S],
) -> Result<BTreeSet<ModelId>, ValidationError> {
    if names.is_empty()
        || names
            .iter()
            .any(|n| n.as_ref().trim().eq_ignore_ascii_case("all"))
    {
        return Ok(ModelId::ALL.into_iter().collect());
    }
    names
        .iter()
        .map(|n| {
            n.as_ref()
                .parse::<ModelId>()
                .map_err(|_| ValidationError::UnknownModel(n.as_ref().to_string()))
        })
        .collect()
}

/// Sanitize and strictly validate raw features, then run the selected models
///
/// Selection and validation failures abort the request; model failures are
/// reported inside the bundle.
pub fn run_predictions<S: AsRef<str>>(
    provider: &dyn ModelProvider,
    raw: &Map<String, Value>,
    models: &[S],
) -> Result<PredictionBundle, WellnessError> {
    let selection = parse_model_selection(models)?;
    let features = validate(&sanitize(raw))?;
    Ok(PredictionOrchestrator::new(provider).run(&features, &selection))
}

/// Chains the cluster, risk and PRWI models over a model provider
pub struct PredictionOrchestrator<'a> {
    provider: &'a dyn ModelProvider,
    logger: StructuredLogger,
    metrics: ServiceMetrics,
}

impl<'a> PredictionOrchestrator<'a> {
    pub fn new(provider: &'a dyn ModelProvider) -> Self {
        Self {
            provider,
            logger: StructuredLogger::default(),
            metrics: ServiceMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Evaluate the selected models; every selected id appears in the bundle
    pub fn run(
        &self,
        features: &CanonicalFeatureVector,
        selection: &BTreeSet<ModelId>,
    ) -> PredictionBundle {
        let start = Instant::now();

        let cluster = selection
            .contains(&ModelId::Cluster)
            .then(|| self.record(ModelId::Cluster, self.run_cluster(features)));
        let risk = selection
            .contains(&ModelId::Risk)
            .then(|| self.record(ModelId::Risk, self.run_risk(features)));

        let prwi = selection.contains(&ModelId::Prwi).then(|| {
            let ensemble = EnsembleFeatureVector::from_signals(
                risk.as_ref().and_then(|r| r.as_ref().ok()).map(RiskOutcome::signal),
                cluster
                    .as_ref()
                    .and_then(|c| c.as_ref().ok())
                    .map(ClusterOutcome::signal),
            );
            self.record(ModelId::Prwi, self.run_prwi(features, ensemble))
        });

        let bundle = PredictionBundle {
            clusterdev: cluster.map(ModelOutcome::from),
            risk_assessment: risk.map(ModelOutcome::from),
            prwi_score: prwi.map(ModelOutcome::from),
        };

        let elapsed = start.elapsed();
        self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
        self.logger.log_prediction_completed(
            &selection.iter().map(ModelId::key).collect::<Vec<_>>(),
            bundle.failures(),
            elapsed.as_millis(),
        );
        bundle
    }

    fn record<T>(&self, id: ModelId, result: Result<T, ModelError>) -> Result<T, ModelError> {
        match &result {
            Ok(_) => self.metrics.inc_model_prediction(id.key(), "success"),
            Err(e) => {
                self.metrics.inc_model_prediction(id.key(), "error");
                self.logger.log_model_failure(id.key(), &e.to_string());
            }
        }
        result
    }

    fn degraded(&self, id: ModelId) -> bool {
        self.provider.status(id) == ModelStatus::Degraded
    }

    fn run_cluster(&self, features: &CanonicalFeatureVector) -> Result<ClusterOutcome, ModelError> {
        let id = ModelId::Cluster;
        let model = self.provider.model(id)?;
        let input = features.model_input(&CLUSTER_FEATURES);

        let label = model.predict(&input).map_err(|e| prediction_error(id, e))?;
        let probabilities = model
            .predict_proba(&input)
            .map_err(|e| prediction_error(id, e))?;
        let max = probabilities
            .iter()
            .copied()
            .reduce(f32::max)
            .ok_or_else(|| ModelError::Prediction {
                model: id,
                message: "empty probability output".to_string(),
            })?;
        let deviation_score = f64::from(max) * 100.0;
        ensure_finite(id, deviation_score)?;
        if !(0.0..=100.0).contains(&deviation_score) {
            return Err(ModelError::Prediction {
                model: id,
                message: format!("deviation score {} outside 0-100", deviation_score),
            });
        }

        Ok(ClusterOutcome {
            cluster: label.round() as i64,
            deviation_score,
            interpretation: interpret_deviation(deviation_score).to_string(),
            degraded: self.degraded(id),
            model_version: model.version().to_string(),
        })
    }

    fn run_risk(&self, features: &CanonicalFeatureVector) -> Result<RiskOutcome, ModelError> {
        let id = ModelId::Risk;
        let model = self.provider.model(id)?;
        let input = features.model_input(&RISK_FEATURES);

        let class = model.predict(&input).map_err(|e| prediction_error(id, e))?;
        ensure_finite(id, f64::from(class))?;
        let probs = model
            .predict_proba(&input)
            .map_err(|e| prediction_error(id, e))?;
        // Missing class columns read as zero
        let prob = |i: usize| probs.get(i).copied().map(f64::from).unwrap_or(0.0);

        let risk_class = class.round() as i64;
        let level = RiskLevel::from_class(risk_class);

        Ok(RiskOutcome {
            risk_level: level.map(|l| l.as_str()).unwrap_or("Unknown").to_string(),
            risk_class,
            probabilities: RiskProbabilities {
                low: prob(0),
                medium: prob(1),
                high: prob(2),
            },
            interpretation: interpret_risk(level).to_string(),
            degraded: self.degraded(id),
            model_version: model.version().to_string(),
        })
    }

    fn run_prwi(
        &self,
        features: &CanonicalFeatureVector,
        ensemble: EnsembleFeatureVector,
    ) -> Result<PrwiOutcome, ModelError> {
        let id = ModelId::Prwi;
        let model = self.provider.model(id)?;
        let input = ensemble.model_input(features, &PRWI_FEATURES);

        let raw = model.predict(&input).map_err(|e| prediction_error(id, e))?;
        ensure_finite(id, f64::from(raw))?;
        let prwi_score = f64::from(raw).clamp(0.0, 100.0);

        Ok(PrwiOutcome {
            prwi_score,
            interpretation: interpret_prwi(prwi_score).to_string(),
            ensemble_features: ensemble,
            degraded: self.degraded(id),
            model_version: model.version().to_string(),
        })
    }
}

impl ClusterOutcome {
    fn signal(&self) -> ClusterSignal {
        ClusterSignal {
            deviation_score: self.deviation_score,
            label: self.cluster,
        }
    }
}

impl RiskOutcome {
    fn signal(&self) -> RiskSignal {
        RiskSignal {
            prob_low: self.probabilities.low,
            prob_medium: self.probabilities.medium,
            prob_high: self.probabilities.high,
            class: self.risk_class.clamp(0, 2) as u8,
        }
    }
}

fn prediction_error(model: ModelId, e: anyhow::Error) -> ModelError {
    ModelError::Prediction {
        model,
        message: format!("{:#}", e),
    }
}

fn ensure_finite(model: ModelId, value: f64) -> Result<(), ModelError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::Prediction {
            model,
            message: format!("non-finite model output {}", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{FallbackModel, Model, ModelRegistry};
    use anyhow::Result;
    use std::sync::Mutex;

    fn features() -> CanonicalFeatureVector {
        CanonicalFeatureVector {
            avg_cycle_length: 28.5,
            std_cycle_length: 0.7,
            irregular_cycles_percent: 0.0,
            avg_luteal_phase: 15.0,
            short_luteal_percent: 0.0,
            avg_menses_length: 5.0,
            unusual_bleeding_percent: 0.0,
            avg_ovulation_day: 14.5,
            ovulation_variability: 0.7,
            avg_bleeding_intensity: 3.0,
            age: 29,
            bmi: 22.4,
            total_cycles: 3,
            number_pregnancies: 1,
            abortions: 0,
            age_at_menarche: 13,
            breastfeeding: 0,
            avg_cycle_length_percent: Some(1.8),
        }
    }

    /// Returns fixed outputs and remembers the last input row
    struct StubModel {
        label: f32,
        proba: Vec<f32>,
        last_input: Mutex<Vec<f32>>,
    }

    impl StubModel {
        fn boxed(label: f32, proba: Vec<f32>) -> Box<dyn Model> {
            Box::new(Self {
                label,
                proba,
                last_input: Mutex::new(Vec::new()),
            })
        }
    }

    impl Model for StubModel {
        fn predict(&self, input: &[f32]) -> Result<f32> {
            *self.last_input.lock().unwrap() = input.to_vec();
            Ok(self.label)
        }

        fn predict_proba(&self, _input: &[f32]) -> Result<Vec<f32>> {
            Ok(self.proba.clone())
        }

        fn version(&self) -> &str {
            "stub-v1"
        }
    }

    struct FailingModel;

    impl Model for FailingModel {
        fn predict(&self, _input: &[f32]) -> Result<f32> {
            anyhow::bail!("tensor shape mismatch")
        }

        fn predict_proba(&self, _input: &[f32]) -> Result<Vec<f32>> {
            anyhow::bail!("tensor shape mismatch")
        }

        fn version(&self) -> &str {
            "broken"
        }
    }

    fn all() -> BTreeSet<ModelId> {
        ModelId::ALL.into_iter().collect()
    }

    #[test]
    fn test_full_chain_feeds_prwi_from_upstream() {
        let registry = ModelRegistry::empty()
            .with_model(ModelId::Cluster, StubModel::boxed(2.0, vec![0.1, 0.8, 0.1]))
            .with_model(ModelId::Risk, StubModel::boxed(2.0, vec![0.1, 0.2, 0.7]))
            .with_model(ModelId::Prwi, StubModel::boxed(72.5, vec![]));
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &all());

        let cluster = bundle.clusterdev.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(cluster.cluster, 2);
        assert!((cluster.deviation_score - 80.0).abs() < 1e-4);
        assert!(cluster.interpretation.starts_with("Poor"));
        assert!(!cluster.degraded);

        let risk = bundle.risk_assessment.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(risk.risk_level, "High");
        assert!((risk.probabilities.high - 0.7).abs() < 1e-6);

        let prwi = bundle.prwi_score.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(prwi.prwi_score, 72.5);
        assert!(prwi.interpretation.starts_with("High Risk"));
        assert_eq!(prwi.ensemble_features.risk_class, 2);
        assert!((prwi.ensemble_features.cluster_dev_score - 80.0).abs() < 1e-4);
        assert!((prwi.ensemble_features.stability_score - 20.0).abs() < 1e-4);
        assert_eq!(bundle.failures(), 0);
    }

    #[test]
    fn test_prwi_alone_uses_default_ensemble() {
        let registry = ModelRegistry::fallback_only();
        let selection = BTreeSet::from([ModelId::Prwi]);
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &selection);

        assert!(bundle.clusterdev.is_none());
        assert!(bundle.risk_assessment.is_none());
        let prwi = bundle.prwi_score.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(
            prwi.ensemble_features,
            EnsembleFeatureVector::from_signals(None, None)
        );
        assert!(prwi.degraded);
        assert_eq!(prwi.model_version, "fallback");
    }

    #[test]
    fn test_failing_model_is_isolated() {
        let registry = ModelRegistry::fallback_only()
            .with_model(ModelId::Risk, Box::new(FailingModel));
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &all());

        match &bundle.risk_assessment {
            Some(ModelOutcome::Failure { error }) => {
                assert!(error.contains("risk_assessment prediction failed"));
                assert!(error.contains("tensor shape mismatch"));
            }
            other => panic!("expected risk failure, got {other:?}"),
        }
        assert!(bundle.clusterdev.as_ref().unwrap().success().is_some());
        let prwi = bundle.prwi_score.as_ref().and_then(|o| o.success()).unwrap();
        // Risk side of the ensemble falls back to the prior
        assert_eq!(prwi.ensemble_features.risk_prob_high, 0.33);
        assert_eq!(prwi.ensemble_features.risk_class, 1);
        assert_eq!(bundle.failures(), 1);
    }

    #[test]
    fn test_cluster_without_probabilities_fails() {
        for proba in [vec![], vec![1.7]] {
            let registry = ModelRegistry::fallback_only()
                .with_model(ModelId::Cluster, StubModel::boxed(1.0, proba));
            let bundle = PredictionOrchestrator::new(&registry).run(&features(), &all());

            match &bundle.clusterdev {
                Some(ModelOutcome::Failure { error }) => {
                    assert!(error.contains("clusterdev prediction failed"));
                }
                other => panic!("expected cluster failure, got {other:?}"),
            }
            let prwi = bundle.prwi_score.as_ref().and_then(|o| o.success()).unwrap();
            // Cluster side of the ensemble falls back to the prior
            assert_eq!(prwi.ensemble_features.cluster_dev_score, 50.0);
            assert_eq!(prwi.ensemble_features.stability_score, 50.0);
            assert_eq!(bundle.failures(), 1);
        }
    }

    #[test]
    fn test_unavailable_models_reported_per_entry() {
        let registry = ModelRegistry::empty();
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &all());
        assert_eq!(bundle.failures(), 3);

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["clusterdev"]["error"], "clusterdev model not loaded");
        assert_eq!(json["prwi_score"]["error"], "prwi_score model not loaded");
    }

    #[test]
    fn test_prwi_score_clamped() {
        let registry = ModelRegistry::empty()
            .with_model(ModelId::Prwi, StubModel::boxed(140.0, vec![]));
        let selection = BTreeSet::from([ModelId::Prwi]);
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &selection);
        let prwi = bundle.prwi_score.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(prwi.prwi_score, 100.0);
    }

    #[test]
    fn test_unknown_risk_class() {
        let registry = ModelRegistry::empty()
            .with_model(ModelId::Risk, StubModel::boxed(7.0, vec![0.5, 0.5]));
        let selection = BTreeSet::from([ModelId::Risk]);
        let bundle = PredictionOrchestrator::new(&registry).run(&features(), &selection);
        let risk = bundle.risk_assessment.as_ref().and_then(|o| o.success()).unwrap();
        assert_eq!(risk.risk_level, "Unknown");
        assert_eq!(risk.interpretation, "Unable to interpret risk level");
        assert_eq!(risk.probabilities.high, 0.0);
    }

    #[test]
    fn test_model_inputs_follow_layout() {
        let risk = FallbackModel::new(ModelId::Risk);
        let row = features().model_input(&RISK_FEATURES);
        assert_eq!(row.len(), 13);
        assert_eq!(row[1], 0.0);
        assert_eq!(row[10], 29.0);
        assert!(risk.predict(&row).is_ok());
    }

    #[test]
    fn test_run_predictions_validates_before_running() {
        let registry = ModelRegistry::fallback_only();
        let mut raw = match serde_json::to_value(features()).unwrap() {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        raw.insert("Age".into(), serde_json::json!("29"));

        let bundle = run_predictions(&registry, &raw, &["risk"]).unwrap();
        assert!(bundle.risk_assessment.is_some());
        assert!(bundle.prwi_score.is_none());

        raw.remove("BMI");
        assert!(matches!(
            run_predictions::<&str>(&registry, &raw, &[]),
            Err(WellnessError::Validation(ValidationError::MissingFields(_)))
        ));
        assert!(matches!(
            run_predictions(&registry, &raw, &["horoscope"]),
            Err(WellnessError::Validation(ValidationError::UnknownModel(_)))
        ));
    }

    #[test]
    fn test_parse_model_selection() {
        let all = parse_model_selection::<&str>(&[]).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(parse_model_selection(&["all", "risk"]).unwrap().len(), 3);

        let some = parse_model_selection(&["risk", "prwi"]).unwrap();
        assert_eq!(
            some.into_iter().collect::<Vec<_>>(),
            vec![ModelId::Risk, ModelId::Prwi]
        );

        assert_eq!(
            parse_model_selection(&["weather"]),
            Err(ValidationError::UnknownModel("weather".to_string()))
        );
    }
}
