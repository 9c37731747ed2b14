//! ONNX inference using tract
//!
//! Models are exported from scikit-learn with probability maps disabled, so a
//! classifier yields its label as output 0 and a `[1, classes]` probability
//! tensor as output 1, while a regressor yields a single `[1, 1]` output.

use super::Model;
use anyhow::{Context, Result};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX model loaded once and evaluated read-only
pub struct OnnxModel {
    model: TractModel,
    num_features: usize,
    version: String,
}

impl OnnxModel {
    /// Parse and optimize a model from bytes, fixing the input shape to `[1, num_features]`
    pub fn from_bytes(
        model_bytes: &[u8],
        num_features: usize,
        version: impl Into<String>,
    ) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, num_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            model,
            num_features,
            version: version.into(),
        })
    }

    fn run(&self, input: &[f32]) -> Result<TVec<TValue>> {
        if input.len() != self.num_features {
            anyhow::bail!(
                "Model input has {} values, expected {}",
                input.len(),
                self.num_features
            );
        }

        let start = Instant::now();
        let tensor: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, self.num_features), input.to_vec())
                .context("Failed to shape model input")?
                .into();
        let outputs = self.model.run(tvec!(tensor.into()))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                version = %self.version,
                "Inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(outputs)
    }
}

/// Flatten an output tensor of any numeric type into f32 values
fn output_values(outputs: &TVec<TValue>, index: usize) -> Result<Vec<f32>> {
    let output = outputs
        .get(index)
        .with_context(|| format!("No output {} from model", index))?;
    let values = output
        .cast_to::<f32>()
        .context("Model output is not numeric")?;
    let view = values.to_array_view::<f32>()?;
    Ok(view.iter().copied().collect())
}

impl Model for OnnxModel {
    fn predict(&self, input: &[f32]) -> Result<f32> {
        let outputs = self.run(input)?;
        output_values(&outputs, 0)?
            .first()
            .copied()
            .context("Model produced an empty prediction")
    }

    fn predict_proba(&self, input: &[f32]) -> Result<Vec<f32>> {
        let outputs = self.run(input)?;
        let probabilities = output_values(&outputs, 1)?;
        if probabilities.is_empty() {
            anyhow::bail!("Model produced no class probabilities");
        }
        Ok(probabilities)
    }

    fn version(&self) -> &str {
        &self.version
    }
}
