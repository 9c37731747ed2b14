//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use wellness_lib::predictor::ModelSource;
use wellness_lib::{DerivationParams, ModelId, SessionConfig};

/// Server configuration
///
/// Read from `WELLNESS_*` environment variables, with an optional
/// `wellness.{toml,yaml,json}` file in the working directory underneath.
/// Nested derivation overrides use a double underscore, for example
/// `WELLNESS_DERIVATION__IRREGULAR_THRESHOLD_DAYS=8`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported in structured logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding the exported models
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_cluster_model_file")]
    pub cluster_model_file: String,

    #[serde(default = "default_risk_model_file")]
    pub risk_model_file: String,

    #[serde(default = "default_prwi_model_file")]
    pub prwi_model_file: String,

    /// Expected SHA-256 per model file; unchecked when absent
    #[serde(default)]
    pub cluster_model_sha256: Option<String>,
    #[serde(default)]
    pub risk_model_sha256: Option<String>,
    #[serde(default)]
    pub prwi_model_sha256: Option<String>,

    /// Serve heuristic fallbacks for models that fail to load
    #[serde(default = "default_fallback_models")]
    pub fallback_models: bool,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_session_purge_interval")]
    pub session_purge_interval_secs: u64,

    #[serde(default)]
    pub derivation: DerivationParams,
}

fn default_service_name() -> String {
    "wellness-server".to_string()
}

fn default_api_port() -> u16 {
    5002
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_cluster_model_file() -> String {
    "clusterdev.onnx".to_string()
}

fn default_risk_model_file() -> String {
    "risk_assessment.onnx".to_string()
}

fn default_prwi_model_file() -> String {
    "prwi_score.onnx".to_string()
}

fn default_fallback_models() -> bool {
    true
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_session_purge_interval() -> u64 {
    60
}

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("wellness").required(false))
            .add_source(
                config::Environment::with_prefix("WELLNESS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    /// Model file locations keyed by model
    pub fn model_sources(&self) -> HashMap<ModelId, ModelSource> {
        let source = |file: &str, sha256: &Option<String>| ModelSource {
            path: self.model_dir.join(file),
            sha256: sha256.clone(),
            version: None,
        };
        HashMap::from([
            (
                ModelId::Cluster,
                source(&self.cluster_model_file, &self.cluster_model_sha256),
            ),
            (
                ModelId::Risk,
                source(&self.risk_model_file, &self.risk_model_sha256),
            ),
            (
                ModelId::Prwi,
                source(&self.prwi_model_file, &self.prwi_model_sha256),
            ),
        ])
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_secs(self.session_ttl_secs),
            max_sessions: self.max_sessions,
        }
    }

    pub fn session_purge_interval(&self) -> Duration {
        Duration::from_secs(self.session_purge_interval_secs.max(1))
    }
}
