use std::sync::{Arc, Mutex};

use crate::burst::{BurstShape, BurstTensor};
use crate::error::PipelineError;

use super::backend::Classifier;
use super::labels::LabelVocabulary;
use super::registry::SharedClassifier;

/// Decoded classifier result.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub score: f32,
}

/// Index and value of the maximum score.
///
/// NaN never wins. On exact ties the lowest index wins. `None` when there is
/// nothing comparable (empty or all-NaN input).
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in scores.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best
}

/// Runs the classifier on a complete burst and turns its scores into a label.
pub struct InferenceAdapter {
    classifier: Option<SharedClassifier>,
    vocabulary: LabelVocabulary,
    shape: BurstShape,
}

impl InferenceAdapter {
    pub fn new(
        classifier: Option<SharedClassifier>,
        vocabulary: LabelVocabulary,
        shape: BurstShape,
    ) -> Self {
        Self {
            classifier,
            vocabulary,
            shape,
        }
    }

    /// Adapter owning a single classifier.
    pub fn with_classifier<C: Classifier + 'static>(
        classifier: C,
        vocabulary: LabelVocabulary,
        shape: BurstShape,
    ) -> Self {
        let shared: SharedClassifier = Arc::new(Mutex::new(classifier));
        Self::new(Some(shared), vocabulary, shape)
    }

    pub fn vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    pub fn is_available(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn warm_up(&self) -> Result<(), PipelineError> {
        let classifier = self.classifier()?;
        let mut guard = classifier
            .lock()
            .map_err(|_| PipelineError::ClassifierUnavailable("classifier lock poisoned".into()))?;
        guard
            .warm_up()
            .map_err(|e| PipelineError::ClassifierUnavailable(format!("warm-up failed: {:#}", e)))
    }

    pub fn predict(&self, tensor: &BurstTensor) -> Result<Prediction, PipelineError> {
        let classifier = self.classifier()?;
        if tensor.shape() != self.shape {
            return Err(PipelineError::shape(
                "inference input",
                &self.shape.dims(),
                &tensor.dims(),
            ));
        }

        let scores = {
            let mut guard = classifier.lock().map_err(|_| {
                PipelineError::ClassifierUnavailable("classifier lock poisoned".into())
            })?;
            guard
                .infer(tensor)
                .map_err(|e| PipelineError::InferenceFailed(format!("{:#}", e)))?
        };

        let (index, score) = argmax(&scores).ok_or_else(|| {
            PipelineError::NoUsableOutput(format!(
                "no comparable scores in output of length {}",
                scores.len()
            ))
        })?;
        let label = self.vocabulary.label(index).ok_or_else(|| {
            PipelineError::NoUsableOutput(format!("class index {} has no label", index))
        })?;

        Ok(Prediction {
            label: label.to_string(),
            index,
            score,
        })
    }

    fn classifier(&self) -> Result<&SharedClassifier, PipelineError> {
        self.classifier.as_ref().ok_or_else(|| {
            PipelineError::ClassifierUnavailable("no classifier configured".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst::BurstBuffer;
    use crate::tokenize::TokenizedFrame;
    use anyhow::{anyhow, Result};

    struct FixedScores(Vec<f32>);

    impl Classifier for FixedScores {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn infer(&mut self, _tensor: &BurstTensor) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn infer(&mut self, _tensor: &BurstTensor) -> Result<Vec<f32>> {
            Err(anyhow!("device lost"))
        }
    }

    fn shape() -> BurstShape {
        BurstShape {
            frames: 1,
            patches: 1,
            patch_len: 2,
        }
    }

    fn tensor(shape: BurstShape) -> BurstTensor {
        let mut buf = BurstBuffer::new(shape);
        let frame =
            TokenizedFrame::from_patches(vec![vec![0.5; shape.patch_len]; shape.patches]).unwrap();
        for _ in 0..shape.frames {
            buf.append(&frame).unwrap();
        }
        buf.finalize().unwrap()
    }

    fn adapter(scores: Vec<f32>) -> InferenceAdapter {
        InferenceAdapter::with_classifier(FixedScores(scores), LabelVocabulary::standard(), shape())
    }

    #[test]
    fn argmax_prefers_first_of_equal_maxima() {
        assert_eq!(argmax(&[0.1, 0.7, 0.3, 0.7]), Some((1, 0.7)));
        assert_eq!(argmax(&[2.0, 2.0]), Some((0, 2.0)));
    }

    #[test]
    fn argmax_skips_nan_and_handles_empty() {
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax(&[f32::NAN, -1.0, f32::NAN]), Some((1, -1.0)));
        assert_eq!(
            argmax(&[f32::NEG_INFINITY, f32::NEG_INFINITY]),
            Some((0, f32::NEG_INFINITY))
        );
    }

    #[test]
    fn max_at_index_zero_maps_to_first_label() {
        let prediction = adapter(vec![0.9, 0.05, 0.05]).predict(&tensor(shape())).unwrap();
        assert_eq!(prediction.index, 0);
        assert_eq!(prediction.label, "ぜろ");
    }

    #[test]
    fn tie_resolves_to_lower_index_label() {
        let mut scores = vec![0.0; 25];
        scores[3] = 0.5;
        scores[7] = 0.5;
        let prediction = adapter(scores).predict(&tensor(shape())).unwrap();
        assert_eq!(prediction.label, "さん");
    }

    #[test]
    fn index_without_label_is_no_usable_output() {
        let mut scores = vec![0.0; 30];
        scores[27] = 1.0;
        let err = adapter(scores).predict(&tensor(shape())).unwrap_err();
        assert!(matches!(err, PipelineError::NoUsableOutput(_)));
    }

    #[test]
    fn missing_classifier_is_distinct_from_bad_output() {
        let adapter = InferenceAdapter::new(None, LabelVocabulary::standard(), shape());
        assert!(!adapter.is_available());
        assert!(matches!(
            adapter.predict(&tensor(shape())),
            Err(PipelineError::ClassifierUnavailable(_))
        ));
        assert!(matches!(
            adapter.warm_up(),
            Err(PipelineError::ClassifierUnavailable(_))
        ));
    }

    #[test]
    fn backend_error_is_inference_failure() {
        let adapter =
            InferenceAdapter::with_classifier(Broken, LabelVocabulary::standard(), shape());
        let err = adapter.predict(&tensor(shape())).unwrap_err();
        assert_eq!(err, PipelineError::InferenceFailed("device lost".into()));
    }

    #[test]
    fn wrong_tensor_shape_is_rejected_before_inference() {
        let other = BurstShape {
            frames: 2,
            patches: 1,
            patch_len: 2,
        };
        let err = adapter(vec![1.0]).predict(&tensor(other)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }
}
