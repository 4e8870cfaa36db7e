//! Pipeline error taxonomy.
//!
//! Every failure the capture-to-inference pipeline can observe maps onto one
//! `PipelineError` variant. The controller decides what to do with it by its
//! `ErrorClass`, never by matching message text.

use thiserror::Error;

/// How the controller recovers from an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Halts the pipeline. No retries.
    Terminal,
    /// Aborts the current burst; a fresh burst follows the cooldown.
    BurstRecoverable,
    /// Caller bug (shape, overflow, premature finalize).
    Programming,
    /// Deployment problem, reported and the cycle continues.
    Configuration,
    /// Classifier ran but its output could not be turned into a label.
    Decode,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),

    #[error("tokenization failed: {0}")]
    TokenizationFailure(String),

    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("burst buffer already holds {capacity} frames")]
    BurstOverflow { capacity: usize },

    #[error("burst incomplete: {captured} of {target} frames")]
    BurstIncomplete { captured: usize, target: usize },

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("no usable classifier output: {0}")]
    NoUsableOutput(String),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::PermissionDenied => ErrorClass::Terminal,
            PipelineError::FrameUnavailable(_) | PipelineError::TokenizationFailure(_) => {
                ErrorClass::BurstRecoverable
            }
            PipelineError::ShapeMismatch { .. }
            | PipelineError::BurstOverflow { .. }
            | PipelineError::BurstIncomplete { .. } => ErrorClass::Programming,
            PipelineError::ClassifierUnavailable(_) => ErrorClass::Configuration,
            PipelineError::InferenceFailed(_) | PipelineError::NoUsableOutput(_) => {
                ErrorClass::Decode
            }
        }
    }

    pub(crate) fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        PipelineError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
