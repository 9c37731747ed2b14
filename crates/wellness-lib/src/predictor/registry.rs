//! Model registry: loads the three models once at startup
//!
//! A model that fails to load is replaced by its heuristic fallback when
//! fallbacks are enabled, and reported as unavailable otherwise. The registry
//! is immutable after loading and shared read-only between requests.

use super::fallback::FallbackModel;
use super::inference::OnnxModel;
use super::{input_width, Model, ModelProvider, ModelStatus};
use crate::error::ModelError;
use crate::models::ModelId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where to find one model and how to verify it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSource {
    pub path: PathBuf,
    /// Expected SHA-256 of the file, hex encoded
    #[serde(default)]
    pub sha256: Option<String>,
    /// Version label; defaults to a checksum prefix
    #[serde(default)]
    pub version: Option<String>,
}

struct ModelSlot {
    model: Option<Box<dyn Model>>,
    status: ModelStatus,
    detail: Option<String>,
}

impl ModelSlot {
    fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            model: None,
            status: ModelStatus::Unavailable,
            detail: Some(detail.into()),
        }
    }

    fn fallback(id: ModelId, detail: Option<String>) -> Self {
        Self {
            model: Some(Box::new(FallbackModel::new(id))),
            status: ModelStatus::Degraded,
            detail,
        }
    }
}

/// Registry of loaded models keyed by id
pub struct ModelRegistry {
    slots: HashMap<ModelId, ModelSlot>,
}

impl ModelRegistry {
    /// Registry with every model unavailable
    pub fn empty() -> Self {
        let slots = ModelId::ALL
            .iter()
            .map(|&id| (id, ModelSlot::unavailable("no model configured")))
            .collect();
        Self { slots }
    }

    /// Registry serving only heuristic fallbacks
    pub fn fallback_only() -> Self {
        let slots = ModelId::ALL
            .iter()
            .map(|&id| (id, ModelSlot::fallback(id, None)))
            .collect();
        Self { slots }
    }

    /// Install an already loaded model
    pub fn with_model(mut self, id: ModelId, model: Box<dyn Model>) -> Self {
        self.slots.insert(
            id,
            ModelSlot {
                model: Some(model),
                status: ModelStatus::Loaded,
                detail: None,
            },
        );
        self
    }

    /// Load every model from its configured source
    pub async fn load(sources: &HashMap<ModelId, ModelSource>, fallback_enabled: bool) -> Self {
        let mut slots = HashMap::with_capacity(ModelId::ALL.len());

        for id in ModelId::ALL {
            let loaded = match sources.get(&id) {
                Some(source) => load_source(id, source).await,
                None => Err(anyhow::anyhow!("no model file configured")),
            };

            let slot = match loaded {
                Ok(model) => {
                    info!(model = %id, version = %model.version(), "Model loaded");
                    ModelSlot {
                        model: Some(Box::new(model)),
                        status: ModelStatus::Loaded,
                        detail: None,
                    }
                }
                Err(e) => {
                    let detail = format!("{:#}", e);
                    if fallback_enabled {
                        warn!(model = %id, error = %detail, "Model failed to load, using fallback");
                        ModelSlot::fallback(id, Some(detail))
                    } else {
                        warn!(model = %id, error = %detail, "Model failed to load");
                        ModelSlot::unavailable(detail)
                    }
                }
            };
            slots.insert(id, slot);
        }

        Self { slots }
    }

    /// Why a model is degraded or unavailable, if it is
    pub fn detail(&self, id: ModelId) -> Option<&str> {
        self.slots.get(&id).and_then(|s| s.detail.as_deref())
    }

    /// Version of the model serving `id`, if any
    pub fn version(&self, id: ModelId) -> Option<&str> {
        self.slots
            .get(&id)
            .and_then(|s| s.model.as_deref())
            .map(|m| m.version())
    }
}

impl ModelProvider for ModelRegistry {
    fn status(&self, id: ModelId) -> ModelStatus {
        self.slots
            .get(&id)
            .map(|s| s.status)
            .unwrap_or(ModelStatus::Unavailable)
    }

    fn model(&self, id: ModelId) -> Result<&dyn Model, ModelError> {
        self.slots
            .get(&id)
            .and_then(|s| s.model.as_deref())
            .ok_or(ModelError::Unavailable { model: id })
    }
}

async fn load_source(id: ModelId, source: &ModelSource) -> Result<OnnxModel> {
    let bytes = tokio::fs::read(&source.path)
        .await
        .with_context(|| format!("Failed to read model file {:?}", source.path))?;

    let checksum = compute_checksum(&bytes);
    if let Some(expected) = &source.sha256 {
        if !expected.eq_ignore_ascii_case(&checksum) {
            anyhow::bail!(
                "checksum mismatch for {:?}: expected {}, got {}",
                source.path,
                expected,
                checksum
            );
        }
    }

    let version = source
        .version
        .clone()
        .unwrap_or_else(|| format!("sha256:{}", &checksum[..12]));
    let width = input_width(id);

    // Graph optimization is CPU bound
    tokio::task::spawn_blocking(move || OnnxModel::from_bytes(&bytes, width, version))
        .await
        .context("Model loading task failed")?
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
