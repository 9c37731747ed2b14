//! Integration tests for the wellness API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wellness_lib::{
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::ModelRegistry,
    session::FormSection,
    SessionStore,
};
use wellness_server::{
    api::{create_router, AppState},
    record_model_state,
};

async fn setup_test_app(models: ModelRegistry) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SESSION_STORE).await;

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::default();
    record_model_state(&models, &health_registry, &metrics, &logger).await;

    let state = Arc::new(AppState::new(
        health_registry,
        metrics,
        logger,
        Arc::new(models),
        SessionStore::default(),
    ));
    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn cycles() -> Value {
    json!([
        {"startDate": "2024-01-01", "endDate": "2024-01-05", "monthKey": "2024-01"},
        {"startDate": "2024-01-29", "endDate": "2024-02-02", "monthKey": "2024-02"},
        {"startDate": "2024-02-27", "endDate": "2024-03-02", "monthKey": "2024-03"}
    ])
}

fn profile() -> Value {
    json!({
        "Age": 29,
        "BMI": 22.4,
        "Numberpreg": 1,
        "Abortions": 0,
        "AgeM": 13,
        "Breastfeeding": 0
    })
}

fn complete_features() -> Value {
    json!({
        "AvgCycleLength": 28.5,
        "StdCycleLength": 0.7,
        "IrregularCyclesPercent": 0.0,
        "AvgLutealPhase": 15.0,
        "ShortLutealPercent": 0.0,
        "AvgMensesLength": 5.0,
        "UnusualBleedingPercent": 0.0,
        "AvgOvulationDay": 14.5,
        "OvulationVariability": 0.7,
        "AvgBleedingIntensity": 3.0,
        "Age": 29,
        "BMI": 22.4,
        "TotalCycles": 3,
        "Numberpreg": 1,
        "Abortions": 0,
        "AgeM": 13,
        "Breastfeeding": 0
    })
}

#[tokio::test]
async fn test_healthz_reports_fallback_models_as_degraded() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(&app, "GET", "/healthz", None).await;

    // Degraded still serves
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["session_store"]["status"], "healthy");
    assert_eq!(body["components"]["clusterdev"]["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_missing_models_degrade() {
    let (app, _) = setup_test_app(ModelRegistry::empty()).await;
    let (status, body) = send(&app, "GET", "/healthz", None).await;

    // Missing models are reported per request, the service stays up
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["risk_assessment"]["status"], "degraded");
}

#[tokio::test]
async fn test_readyz_lifecycle() {
    let (app, state) = setup_test_app(ModelRegistry::fallback_only()).await;

    let (status, body) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, body) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_prometheus_metrics_endpoint() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("wellness_model_status"));
}

#[tokio::test]
async fn test_api_health_lists_models() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models"]["clusterdev"], true);
    assert_eq!(body["model_status"]["prwi_score"], "degraded");
}

#[tokio::test]
async fn test_section_save_defaults_session_id() {
    let (app, state) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/cycle-data",
        Some(json!({"data": {"AvgCycleLength": 28.5}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Cycle data saved successfully");
    assert_eq!(body["session_id"], "default");
    assert_eq!(
        state.sessions.merged_features("default")["AvgCycleLength"],
        json!(28.5)
    );
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/user-data")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_then_predict_from_session() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/user-data",
        Some(json!({"session_id": "s1", "data": profile()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/api/cycles",
        Some(json!({"session_id": "s1", "cycles": cycles()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/metrics",
        Some(json!({"session_id": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"]["TotalCycles"], 3);
    assert_eq!(body["metrics"]["TotalCycles"], 3);
    assert_eq!(body["health_score"], 100);

    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"session_id": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let results = &body["results"];
    assert!(results["clusterdev"]["deviation_score"].is_number());
    assert!(results["risk_assessment"]["risk_level"].is_string());
    assert!(results["prwi_score"]["prwi_score"].is_number());
    assert_eq!(results["prwi_score"]["degraded"], true);
}

#[tokio::test]
async fn test_inline_metrics_request_is_enough_for_predict() {
    let (app, state) = setup_test_app(ModelRegistry::fallback_only()).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/metrics",
        Some(json!({"session_id": "m1", "profile": profile(), "cycles": cycles()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session = state.sessions.get("m1").unwrap();
    assert_eq!(session.cycles.len(), 3);
    assert_eq!(session.sections[&FormSection::UserData]["BMI"], profile()["BMI"]);

    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"session_id": "m1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["success"], true);
    assert!(body["results"]["prwi_score"]["prwi_score"].is_number());
}

#[tokio::test]
async fn test_predict_with_direct_features_and_selection() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"features": complete_features(), "models": ["risk_assessment"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_object().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["risk_assessment"]["risk_level"], "Low");
}

#[tokio::test]
async fn test_predict_reports_unavailable_models_inline() {
    let (app, _) = setup_test_app(ModelRegistry::empty()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"features": complete_features(), "models": ["clusterdev"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"]["clusterdev"]["error"],
        "clusterdev model not loaded"
    );
}

#[tokio::test]
async fn test_predict_missing_fields() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"session_id": "empty", "features": {"Age": 30}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let missing = body["missing_fields"].as_array().unwrap();
    assert_eq!(missing.len(), 16);
    assert!(missing.contains(&json!("BMI")));
}

#[tokio::test]
async fn test_predict_out_of_range_field() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let mut features = complete_features();
    features["BMI"] = json!(120.0);
    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"features": features})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "BMI");
}

#[tokio::test]
async fn test_predict_unknown_model() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/predict",
        Some(json!({"features": complete_features(), "models": ["horoscope"]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["model"], "horoscope");
}

#[tokio::test]
async fn test_metrics_insufficient_cycles() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/metrics",
        Some(json!({
            "profile": profile(),
            "cycles": [{"startDate": "2024-01-01", "endDate": "2024-01-05"}]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["cycles"], 1);
}

#[tokio::test]
async fn test_metrics_missing_profile() {
    let (app, _) = setup_test_app(ModelRegistry::fallback_only()).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/metrics",
        Some(json!({"session_id": "no-profile", "cycles": cycles()})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["missing_fields"].as_array().unwrap().len(), 6);
}
