//! Wellness CLI
//!
//! A command-line tool for filling form sessions, deriving cycle metrics and
//! requesting predictions from the wellness server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, metrics, predict, session};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:5002";
const DEFAULT_SESSION: &str = "default";

/// Wellness inference CLI
#[derive(Parser)]
#[command(name = "wellness")]
#[command(author, version, about = "CLI for the menstrual wellness inference service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via WELLNESS_API_URL env var)
    #[arg(long, env = "WELLNESS_API_URL")]
    pub api_url: Option<String>,

    /// Session id the command acts on
    #[arg(long, short, env = "WELLNESS_SESSION")]
    pub session: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service and model status
    Health,

    /// Upload a form section from a JSON object file
    Submit {
        /// Section to replace
        #[arg(value_enum)]
        section: session::Section,

        /// JSON file holding the section's fields
        file: PathBuf,
    },

    /// Upload cycle records from a JSON file
    Cycles {
        /// JSON file holding an array of cycles
        file: PathBuf,
    },

    /// Derive cycle metrics and store them in the session
    Metrics {
        /// Cycle records to use instead of the session's stored cycles
        #[arg(long)]
        cycles: Option<PathBuf>,

        /// Profile fields to apply over the session's user data
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Run predictions on the session's features
    Predict {
        /// Extra features applied over the session's sections
        #[arg(long)]
        features: Option<PathBuf>,

        /// Cycle records to derive metrics from first
        #[arg(long)]
        cycles: Option<PathBuf>,

        /// Profile fields used for derivation and prediction
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Models to run (clusterdev, risk_assessment, prwi_score or all)
        #[arg(long, short, value_delimiter = ',')]
        models: Vec<String>,
    },

    /// Manage local CLI defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored defaults
    Show,

    /// Update stored defaults
    Set {
        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        format: Option<output::OutputFormat>,
    },
}

fn format_name(format: output::OutputFormat) -> &'static str {
    match format {
        output::OutputFormat::Table => "table",
        output::OutputFormat::Json => "json",
    }
}

fn run_config(command: ConfigCommands, mut stored: config::Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            output::print_info(&format!(
                "Config file: {}",
                config::Config::config_path()?.display()
            ));
            output::print_json(&stored)?;
        }
        ConfigCommands::Set {
            api_url,
            session,
            format,
        } => {
            if api_url.is_none() && session.is_none() && format.is_none() {
                output::print_warning("Nothing to update");
                return Ok(());
            }
            if let Some(url) = api_url {
                url::Url::parse(&url)?;
                stored.api_url = Some(url);
            }
            if let Some(session) = session {
                stored.default_session = Some(session);
            }
            if let Some(format) = format {
                stored.default_format = Some(format_name(format).to_string());
            }
            stored.save()?;
            output::print_success("Configuration saved");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let stored = config::Config::load().unwrap_or_else(|e| {
        output::print_warning(&format!("Ignoring CLI config: {:#}", e));
        config::Config::default()
    });

    if let Commands::Config(command) = cli.command {
        return run_config(command, stored);
    }

    // Flags and env win over stored defaults
    let api_url = cli
        .api_url
        .or_else(|| stored.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let session_id = cli
        .session
        .or_else(|| stored.default_session.clone())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let format = cli
        .format
        .or_else(|| {
            stored
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::parse_name)
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    let result = match cli.command {
        Commands::Health => health::show_health(&client, format).await,
        Commands::Submit { section, file } => {
            session::submit_section(&client, &session_id, section, &file, format).await
        }
        Commands::Cycles { file } => {
            session::submit_cycles(&client, &session_id, &file, format).await
        }
        Commands::Metrics { cycles, profile } => {
            metrics::derive_metrics(&client, &session_id, cycles, profile, format).await
        }
        Commands::Predict {
            features,
            cycles,
            profile,
            models,
        } => {
            let args = predict::PredictArgs {
                features,
                cycles,
                profile,
                models,
            };
            predict::predict(&client, &session_id, args, format).await
        }
        Commands::Config(_) => Ok(()),
    };

    if let Err(e) = &result {
        if let Some(api_error) = e.downcast_ref::<client::ApiError>() {
            if !api_error.missing_fields.is_empty() {
                output::print_error(&format!(
                    "Missing fields: {}",
                    api_error.missing_fields.join(", ")
                ));
            }
        }
    }
    result
}
