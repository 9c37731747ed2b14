//! Wellness inference library
//!
//! This crate provides the core functionality for:
//! - Cycle record normalization and metric derivation
//! - Feature validation and sanitization
//! - Chained evaluation of the cluster, risk and wellness-index models
//! - Expiring session storage for multi-step forms
//! - Health checks and observability

pub mod cycles;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod session;
pub mod validation;

pub use cycles::{derive_features, DerivationParams, DerivedFeatures};
pub use error::{ModelError, ValidationError, WellnessError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use session::{FormSection, SessionConfig, SessionStore, DEFAULT_SESSION_ID};
