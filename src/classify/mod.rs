mod adapter;
mod backend;
mod backends;
mod labels;
mod registry;

pub use adapter::{argmax, InferenceAdapter, Prediction};
pub use backend::Classifier;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use labels::LabelVocabulary;
pub use registry::{ClassifierRegistry, SharedClassifier};
