//! Wellness inference server
//!
//! HTTP front end over `wellness-lib`: form sessions, metric derivation and
//! chained model predictions, plus health and Prometheus endpoints.

pub mod api;
pub mod config;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wellness_lib::{
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::{ModelProvider, ModelRegistry, ModelStatus},
    ModelId, SessionStore,
};

/// Gauge level exported for a model's load state
fn status_level(status: ModelStatus) -> f64 {
    match status {
        ModelStatus::Loaded => 2.0,
        ModelStatus::Degraded => 1.0,
        ModelStatus::Unavailable => 0.0,
    }
}

fn status_name(status: ModelStatus) -> &'static str {
    match status {
        ModelStatus::Loaded => "loaded",
        ModelStatus::Degraded => "degraded",
        ModelStatus::Unavailable => "unavailable",
    }
}

/// Report a registry's model states to health, metrics and logs
pub async fn record_model_state(
    models: &ModelRegistry,
    health_registry: &HealthRegistry,
    metrics: &ServiceMetrics,
    logger: &StructuredLogger,
) {
    health_registry
        .record_models(models, |id| models.detail(id).map(str::to_string))
        .await;

    for id in ModelId::ALL {
        let status = models.status(id);
        metrics.set_model_status(id.key(), status_level(status));
        logger.log_model_loaded(
            id.key(),
            status_name(status),
            models.version(id),
            models.detail(id),
        );
    }
}

/// Build application state from configuration, loading every model
pub async fn build_state(config: &config::ServerConfig) -> api::AppState {
    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SESSION_STORE).await;

    let models = ModelRegistry::load(&config.model_sources(), config.fallback_models).await;
    record_model_state(&models, &health_registry, &metrics, &logger).await;

    let sessions = SessionStore::new(config.session_config());
    metrics.set_active_sessions(0);

    api::AppState::new(
        health_registry,
        metrics,
        logger,
        Arc::new(models),
        sessions,
    )
    .with_derivation(config.derivation.clone())
}

/// Periodically drop expired sessions
pub fn spawn_session_purger(
    sessions: SessionStore,
    interval: Duration,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.purge_expired();
            let remaining = sessions.len();
            metrics.set_active_sessions(remaining as i64);
            if removed > 0 {
                logger.log_sessions_purged(removed, remaining);
            }
        }
    })
}
