//! Observability infrastructure for the wellness service
//!
//! Provides:
//! - Prometheus metrics (derivation latency, prediction latency, model outcomes, sessions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge,
    GaugeVec, Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    derivation_latency_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    model_predictions: IntCounterVec,
    rejected_requests: IntCounterVec,
    active_sessions: IntGauge,
    model_status: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            derivation_latency_seconds: register_histogram!(
                "wellness_derivation_latency_seconds",
                "Time spent normalizing cycles and deriving features",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register derivation_latency_seconds"),

            prediction_latency_seconds: register_histogram!(
                "wellness_prediction_latency_seconds",
                "Time spent running the model chain for one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            model_predictions: register_int_counter_vec!(
                "wellness_model_predictions_total",
                "Model evaluations by model and outcome",
                &["model", "outcome"]
            )
            .expect("Failed to register model_predictions"),

            rejected_requests: register_int_counter_vec!(
                "wellness_rejected_requests_total",
                "Requests rejected before prediction, by reason",
                &["reason"]
            )
            .expect("Failed to register rejected_requests"),

            active_sessions: register_int_gauge!(
                "wellness_active_sessions",
                "Number of live form sessions"
            )
            .expect("Failed to register active_sessions"),

            model_status: register_gauge_vec!(
                "wellness_model_status",
                "Model load state (2 loaded, 1 degraded, 0 unavailable)",
                &["model"]
            )
            .expect("Failed to register model_status"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_derivation_latency(&self, duration_secs: f64) {
        self.inner().derivation_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count one model evaluation; `outcome` is "success" or "error"
    pub fn inc_model_prediction(&self, model: &str, outcome: &str) {
        self.inner()
            .model_predictions
            .with_label_values(&[model, outcome])
            .inc();
    }

    /// Count a request rejected for insufficient data or invalid input
    pub fn inc_rejected(&self, reason: &str) {
        self.inner()
            .rejected_requests
            .with_label_values(&[reason])
            .inc();
    }

    pub fn set_active_sessions(&self, count: i64) {
        self.inner().active_sessions.set(count);
    }

    pub fn set_model_status(&self, model: &str, level: f64) {
        self.inner()
            .model_status
            .with_label_values(&[model])
            .set(level);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for derivations, predictions
/// and lifecycle events.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("wellness")
    }
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Log a completed derivation
    pub fn log_metrics_derived(&self, session_id: Option<&str>, cycles: u32, health_score: u8) {
        info!(
            event = "metrics_derived",
            service = %self.service,
            session_id = ?session_id,
            cycles = cycles,
            health_score = health_score,
            "Derived cycle metrics"
        );
    }

    /// Log a finished prediction request
    pub fn log_prediction_completed(&self, models: &[&str], failures: usize, elapsed_ms: u128) {
        if failures == 0 {
            info!(
                event = "prediction_completed",
                service = %self.service,
                models = ?models,
                failures = failures,
                elapsed_ms = elapsed_ms,
                "Prediction completed"
            );
        } else {
            warn!(
                event = "prediction_completed",
                service = %self.service,
                models = ?models,
                failures = failures,
                elapsed_ms = elapsed_ms,
                "Prediction completed with model failures"
            );
        }
    }

    /// Log a single model failure inside a prediction
    pub fn log_model_failure(&self, model: &str, error: &str) {
        warn!(
            event = "model_prediction_failed",
            service = %self.service,
            model = %model,
            error = %error,
            "Model prediction failed"
        );
    }

    /// Log the load state of a model at startup
    pub fn log_model_loaded(
        &self,
        model: &str,
        status: &str,
        version: Option<&str>,
        detail: Option<&str>,
    ) {
        if detail.is_none() {
            info!(
                event = "model_loaded",
                service = %self.service,
                model = %model,
                status = %status,
                version = ?version,
                "Model ready"
            );
        } else {
            warn!(
                event = "model_loaded",
                service = %self.service,
                model = %model,
                status = %status,
                version = ?version,
                detail = ?detail,
                "Model not loaded from disk"
            );
        }
    }

    /// Log expired or evicted sessions
    pub fn log_sessions_purged(&self, removed: usize, remaining: usize) {
        info!(
            event = "sessions_purged",
            service = %self.service,
            removed = removed,
            remaining = remaining,
            "Purged expired sessions"
        );
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            port = port,
            "Wellness service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Wellness service shutting down"
        );
    }
}
