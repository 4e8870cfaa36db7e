use anyhow::Result;

use crate::burst::BurstTensor;

/// Gesture classifier backend.
///
/// The model is opaque to the pipeline: a complete burst tensor goes in, one
/// score per class comes out. Label selection happens in `InferenceAdapter`.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a complete burst. Returns the per-class score vector.
    fn infer(&mut self, tensor: &BurstTensor) -> Result<Vec<f32>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
