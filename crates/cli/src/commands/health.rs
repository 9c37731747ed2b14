//! Service health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, print_warning, OutputFormat};

/// Row for model status table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Show service and per-model status
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(40));
            println!("Status: {}", color_status(&health.status));
            if let Some(ts) = &health.timestamp {
                println!("Checked: {}", format_timestamp(ts));
            }
            println!();

            let rows: Vec<ModelRow> = health
                .models
                .iter()
                .map(|(model, available)| ModelRow {
                    model: model.clone(),
                    available: if *available {
                        "yes".green().to_string()
                    } else {
                        "no".red().to_string()
                    },
                    status: health
                        .model_status
                        .get(model)
                        .map(|s| color_status(s))
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if health.models.values().any(|available| !available) {
                print_warning("Some models are unavailable; their predictions will report errors");
            }
        }
    }

    Ok(())
}
