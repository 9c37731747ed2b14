//! Prediction command

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::client::{ApiClient, MetricsRequest, ModelResult, PredictRequest, PredictionResults};
use crate::commands::{read_cycles, read_object};
use crate::output::{
    color_prwi, color_risk, format_probability, format_score, print_error, print_info, print_json,
    OutputFormat,
};

/// Row for predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Interpretation")]
    interpretation: String,
    #[tabled(rename = "Source")]
    source: String,
}

fn source(degraded: bool, version: &Option<String>) -> String {
    match (degraded, version) {
        (true, _) => "fallback".yellow().to_string(),
        (false, Some(v)) => v.clone(),
        (false, None) => "model".to_string(),
    }
}

fn failed_row(model: &str, error: &str) -> PredictionRow {
    PredictionRow {
        model: model.to_string(),
        result: "error".red().to_string(),
        interpretation: error.to_string(),
        source: "-".to_string(),
    }
}

fn rows(results: &PredictionResults) -> Vec<PredictionRow> {
    let mut rows = Vec::new();

    match &results.clusterdev {
        Some(ModelResult::Ok(r)) => rows.push(PredictionRow {
            model: "clusterdev".to_string(),
            result: format!(
                "cluster {} / deviation {}",
                r.cluster,
                format_score(r.deviation_score)
            ),
            interpretation: r.interpretation.clone(),
            source: source(r.degraded, &r.model_version),
        }),
        Some(ModelResult::Failed { error }) => rows.push(failed_row("clusterdev", error)),
        None => {}
    }

    match &results.risk_assessment {
        Some(ModelResult::Ok(r)) => rows.push(PredictionRow {
            model: "risk_assessment".to_string(),
            result: format!(
                "{} (L {} / M {} / H {})",
                color_risk(&r.risk_level),
                format_probability(r.probabilities.low),
                format_probability(r.probabilities.medium),
                format_probability(r.probabilities.high)
            ),
            interpretation: r.interpretation.clone(),
            source: source(r.degraded, &r.model_version),
        }),
        Some(ModelResult::Failed { error }) => rows.push(failed_row("risk_assessment", error)),
        None => {}
    }

    match &results.prwi_score {
        Some(ModelResult::Ok(r)) => rows.push(PredictionRow {
            model: "prwi_score".to_string(),
            result: color_prwi(r.prwi_score),
            interpretation: r.interpretation.clone(),
            source: source(r.degraded, &r.model_version),
        }),
        Some(ModelResult::Failed { error }) => rows.push(failed_row("prwi_score", error)),
        None => {}
    }

    rows
}

/// Inputs for a prediction run
#[derive(Debug, Default)]
pub struct PredictArgs {
    /// Extra features applied over the session
    pub features: Option<PathBuf>,
    /// Cycle records to derive metrics from before predicting
    pub cycles: Option<PathBuf>,
    /// Profile fields sent with the derivation and the prediction
    pub profile: Option<PathBuf>,
    pub models: Vec<String>,
}

/// Run predictions for a session
///
/// With `--cycles` the metrics are derived first, which stores them in the
/// session's cycle data.
pub async fn predict(
    client: &ApiClient,
    session_id: &str,
    args: PredictArgs,
    format: OutputFormat,
) -> Result<()> {
    let profile = args.profile.as_deref().map(read_object).transpose()?;

    if let Some(cycles) = args.cycles.as_deref() {
        let derivation = MetricsRequest {
            session_id: session_id.to_string(),
            profile: profile.clone().unwrap_or_default(),
            cycles: Some(read_cycles(cycles)?),
        };
        let derived = client.derive_metrics(&derivation).await?;
        if format == OutputFormat::Table {
            print_info(&format!("Derived metrics, cycle health score {}", derived.health_score));
        }
    }

    let mut features = profile;
    if let Some(extra) = args.features.as_deref().map(read_object).transpose()? {
        features.get_or_insert_with(Default::default).extend(extra);
    }

    let request = PredictRequest {
        session_id: session_id.to_string(),
        features,
        models: args.models,
    };
    let response = client.predict(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let rows = rows(&response.results);
            if rows.is_empty() {
                print_error("No model results returned");
                return Ok(());
            }
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_skip_unrequested_models() {
        let results: PredictionResults = serde_json::from_value(serde_json::json!({
            "prwi_score": {"prwi_score": 42.0, "interpretation": "Medium Risk", "degraded": true},
            "clusterdev": {"error": "clusterdev model not loaded"}
        }))
        .unwrap();

        let rows = rows(&results);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model, "clusterdev");
        assert!(rows[0].interpretation.contains("not loaded"));
        assert_eq!(rows[1].model, "prwi_score");
    }
}
