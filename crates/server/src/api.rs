//! HTTP API: form sessions, metric derivation, predictions, health and metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use wellness_lib::{
    derive_features,
    health::{ComponentStatus, HealthRegistry},
    models::{CycleRecord, ModelId},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::{parse_model_selection, ModelProvider, ModelRegistry, PredictionOrchestrator},
    session::{FormSection, SessionStore, DEFAULT_SESSION_ID},
    validation::{sanitize, validate},
    DerivationParams, ValidationError, WellnessError,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
    pub models: Arc<ModelRegistry>,
    pub sessions: SessionStore,
    pub derivation: DerivationParams,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ServiceMetrics,
        logger: StructuredLogger,
        models: Arc<ModelRegistry>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            models,
            sessions,
            derivation: DerivationParams::default(),
        }
    }

    pub fn with_derivation(mut self, derivation: DerivationParams) -> Self {
        self.derivation = derivation;
        self
    }

    fn touch_sessions(&self) {
        self.metrics.set_active_sessions(self.sessions.len() as i64);
    }
}

/// Request failures, rendered as `{ "success": false, "error": ... }`
#[derive(Debug)]
pub enum ApiError {
    Wellness(WellnessError),
    BadRequest(String),
    Internal(String),
}

impl From<WellnessError> for ApiError {
    fn from(e: WellnessError) -> Self {
        ApiError::Wellness(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Wellness(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let metrics = ServiceMetrics::new();
        let (status, body) = match self {
            ApiError::Wellness(WellnessError::InsufficientData { cycles }) => {
                metrics.inc_rejected("insufficient_data");
                let message = WellnessError::InsufficientData { cycles }.to_string();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "success": false, "error": message, "cycles": cycles }),
                )
            }
            ApiError::Wellness(WellnessError::Validation(e)) => {
                metrics.inc_rejected("validation");
                (StatusCode::BAD_REQUEST, validation_body(&e))
            }
            ApiError::BadRequest(message) => {
                metrics.inc_rejected("bad_request");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "success": false, "error": message }),
                )
            }
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": message }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn validation_body(e: &ValidationError) -> Value {
    let mut body = json!({ "success": false, "error": e.to_string() });
    let detail = match e {
        ValidationError::MissingFields(fields) => json!({ "missing_fields": fields }),
        ValidationError::InvalidType { field, value } => json!({ "field": field, "value": value }),
        ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        } => json!({ "field": field, "value": value, "min": min, "max": max }),
        ValidationError::UnknownModel(model) => json!({ "model": model }),
    };
    if let (Some(body), Value::Object(detail)) = (body.as_object_mut(), detail) {
        body.extend(detail);
    }
    body
}

fn session_id(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving predictions
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("Failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Per-model availability for clients
async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut models = BTreeMap::new();
    let mut model_status = BTreeMap::new();
    for id in ModelId::ALL {
        let status = state.models.status(id);
        models.insert(id.key(), status.is_available());
        model_status.insert(id.key(), status);
    }

    Json(json!({
        "status": "healthy",
        "models": models,
        "model_status": model_status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SectionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn save_section(
    state: &AppState,
    section: FormSection,
    payload: Result<Json<SectionRequest>, JsonRejection>,
    message: &str,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let session_id = session_id(request.session_id);
    state.sessions.save_section(&session_id, section, request.data);
    state.touch_sessions();

    Ok(Json(json!({
        "success": true,
        "message": message,
        "session_id": session_id,
    })))
}

async fn cycle_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SectionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    save_section(
        &state,
        FormSection::CycleData,
        payload,
        "Cycle data saved successfully",
    )
}

async fn user_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SectionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    save_section(
        &state,
        FormSection::UserData,
        payload,
        "User data saved successfully",
    )
}

async fn symptoms_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SectionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    save_section(
        &state,
        FormSection::SymptomsData,
        payload,
        "Symptoms data saved successfully",
    )
}

#[derive(Debug, Deserialize)]
pub struct CyclesRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cycles: Vec<CycleRecord>,
}

async fn save_cycles(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CyclesRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let session_id = session_id(request.session_id);
    let count = request.cycles.len();
    state.sessions.save_cycles(&session_id, request.cycles);
    state.touch_sessions();

    Ok(Json(json!({
        "success": true,
        "message": "Cycles saved successfully",
        "session_id": session_id,
        "count": count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MetricsRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Profile fields; overlaid on the session's user data
    #[serde(default)]
    pub profile: Map<String, Value>,
    /// Cycle records; the session's stored cycles are used when absent
    #[serde(default)]
    pub cycles: Option<Vec<CycleRecord>>,
}

/// Derive canonical features from cycles and profile
///
/// The derived cycle metrics become the session's cycle data and the merged
/// profile its user data, so a following prediction request needs no other
/// section.
async fn derive_metrics(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MetricsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let session_id = session_id(request.session_id);
    let start = Instant::now();

    let session = state.sessions.get(&session_id);
    let inline_cycles = request.cycles.is_some();
    let cycles = match request.cycles {
        Some(cycles) => cycles,
        None => session.as_ref().map(|s| s.cycles.clone()).unwrap_or_default(),
    };
    let mut profile = session
        .as_ref()
        .and_then(|s| s.sections.get(&FormSection::UserData).cloned())
        .unwrap_or_default();
    profile.extend(request.profile);

    let derived = derive_features(&profile, &cycles, &state.derivation)?;
    state
        .metrics
        .observe_derivation_latency(start.elapsed().as_secs_f64());
    state.logger.log_metrics_derived(
        Some(&session_id),
        derived.metrics.total_cycles,
        derived.health_score,
    );

    state.sessions.save_section(
        &session_id,
        FormSection::CycleData,
        derived.metrics.to_feature_map(),
    );
    state
        .sessions
        .save_section(&session_id, FormSection::UserData, profile);
    if inline_cycles {
        state.sessions.save_cycles(&session_id, cycles);
    }
    state.touch_sessions();

    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "features": derived.features,
        "metrics": derived.metrics,
        "health_score": derived.health_score,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Features applied over the session's form sections
    #[serde(default)]
    pub features: Option<Map<String, Value>>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

/// Run the selected models on the session's features plus any direct features
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let session_id = session_id(request.session_id);

    let mut features = state.sessions.merged_features(&session_id);
    if let Some(direct) = request.features {
        features.extend(direct);
    }
    let models = request.models.unwrap_or_default();
    info!(
        session_id = %session_id,
        features = features.len(),
        models = ?models,
        "Received prediction request"
    );

    let selection = parse_model_selection(models.as_slice())?;
    let features = validate(&sanitize(&features))?;

    // Inference is CPU bound
    let registry = state.models.clone();
    let logger = state.logger.clone();
    let bundle = tokio::task::spawn_blocking(move || {
        PredictionOrchestrator::new(registry.as_ref())
            .with_logger(logger)
            .run(&features, &selection)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))?;

    Ok(Json(json!({ "success": true, "results": bundle })))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/health", get(api_health))
        .route("/api/cycle-data", post(cycle_data))
        .route("/api/user-data", post(user_data))
        .route("/api/symptoms-data", post(symptoms_data))
        .route("/api/cycles", post(save_cycles))
        .route("/api/metrics", post(derive_metrics))
        .route("/api/predict", post(predict))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
