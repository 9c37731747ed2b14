//! API client for communicating with the wellness server

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// Error returned by the server as `{ "success": false, "error": ... }`
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub missing_fields: Vec<String>,
}

/// API client for the wellness server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => ApiError {
                    status,
                    message: parsed.error,
                    missing_fields: parsed.missing_fields,
                },
                Err(_) => ApiError {
                    status,
                    message: body,
                    missing_fields: Vec::new(),
                },
            };
            return Err(error.into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn health(&self) -> Result<ServiceHealth> {
        self.get("api/health").await
    }

    /// Store one form section under a session
    pub async fn save_section(
        &self,
        section: &str,
        session_id: &str,
        data: Map<String, Value>,
    ) -> Result<SaveResponse> {
        let body = SectionRequest {
            session_id: session_id.to_string(),
            data,
        };
        self.post(&format!("api/{}", section), &body).await
    }

    pub async fn save_cycles(&self, session_id: &str, cycles: Vec<Value>) -> Result<SaveResponse> {
        let body = CyclesRequest {
            session_id: session_id.to_string(),
            cycles,
        };
        self.post("api/cycles", &body).await
    }

    pub async fn derive_metrics(&self, request: &MetricsRequest) -> Result<MetricsResponse> {
        self.post("api/metrics", request).await
    }

    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        self.post("api/predict", request).await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub models: BTreeMap<String, bool>,
    #[serde(default)]
    pub model_status: BTreeMap<String, String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRequest {
    pub session_id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclesRequest {
    pub session_id: String,
    pub cycles: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub profile: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub session_id: String,
    pub features: Map<String, Value>,
    pub metrics: Map<String, Value>,
    pub health_score: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub results: PredictionResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusterdev: Option<ModelResult<ClusterResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<ModelResult<RiskResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prwi_score: Option<ModelResult<PrwiResult>>,
}

/// A model's result or the reason it failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelResult<T> {
    Ok(T),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResult {
    pub cluster: i64,
    pub deviation_score: f64,
    pub interpretation: String,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProbabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub risk_level: String,
    pub probabilities: RiskProbabilities,
    pub interpretation: String,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrwiResult {
    pub prwi_score: f64,
    pub interpretation: String,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub model_version: Option<String>,
}
