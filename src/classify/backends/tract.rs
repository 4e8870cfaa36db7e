#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::burst::{BurstShape, BurstTensor};
use crate::classify::backend::Classifier;

/// Tract-based backend for ONNX gesture models.
///
/// The model is loaded from a local file with its input fixed to
/// `[1, N, K, P^2]` f32. The first output is flattened into the score vector.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    shape: BurstShape,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, shape: BurstShape) -> Result<Self> {
        let model_path = model_path.as_ref();
        let [batch, frames, patches, patch_len] = shape.dims();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(batch, frames, patches, patch_len),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, shape })
    }

    fn build_input(&self, tensor: &BurstTensor) -> Result<Tensor> {
        if tensor.shape() != self.shape {
            return Err(anyhow!(
                "burst tensor {:?} does not match model input {:?}",
                tensor.dims(),
                self.shape.dims()
            ));
        }
        let data = tensor.to_vec();
        Tensor::from_shape(&tensor.dims(), &data).context("failed to build input tensor")
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, tensor: &BurstTensor) -> Result<Vec<f32>> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(scores.iter().copied().collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let zeros = Tensor::zero::<f32>(&self.shape.dims()).context("allocate warm-up input")?;
        self.model
            .run(tvec!(zeros.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}
