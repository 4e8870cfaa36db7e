use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::burst::BurstTensor;
use crate::classify::backend::Classifier;

/// Stub backend for testing and model-less runs.
///
/// Scores are derived from a SHA-256 digest of the tensor, so the same burst
/// always yields the same class and different bursts usually do not.
pub struct StubClassifier {
    classes: usize,
}

impl StubClassifier {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new(crate::classify::LabelVocabulary::standard().len())
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, tensor: &BurstTensor) -> Result<Vec<f32>> {
        if self.classes == 0 {
            return Err(anyhow!("stub classifier configured with zero classes"));
        }
        let mut hasher = Sha256::new();
        for value in tensor.view().iter() {
            hasher.update(value.to_le_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();

        Ok((0..self.classes)
            .map(|i| {
                // Fold the class index in so more than 32 classes still get distinct scores.
                let byte = digest[i % digest.len()] ^ (i / digest.len()) as u8;
                byte as f32 / 255.0
            })
            .collect())
    }
}
