//! Metric derivation command

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::client::{ApiClient, MetricsRequest};
use crate::commands::{read_cycles, read_object};
use crate::output::{color_health_score, print_info, print_json, OutputFormat};

/// Row for derived metrics table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Derive cycle metrics from files or from what the session already holds
pub async fn derive_metrics(
    client: &ApiClient,
    session_id: &str,
    cycles: Option<PathBuf>,
    profile: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let request = MetricsRequest {
        session_id: session_id.to_string(),
        profile: profile.as_deref().map(read_object).transpose()?.unwrap_or_default(),
        cycles: cycles.as_deref().map(read_cycles).transpose()?,
    };
    let response = client.derive_metrics(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            println!("{}", "Cycle Metrics".bold());
            println!("{}", "=".repeat(40));
            println!("Session:      {}", response.session_id.cyan());
            println!("Health score: {}", color_health_score(response.health_score));
            println!();

            let rows: Vec<MetricRow> = response
                .metrics
                .iter()
                .map(|(name, value)| MetricRow {
                    name: name.clone(),
                    value: value.to_string(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            print_info("Metrics stored in the session; run `wellness predict` next");
        }
    }

    Ok(())
}
