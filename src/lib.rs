//! Sign Burst
//!
//! Capture-to-inference pipeline for sign gesture recognition: a fixed-length
//! burst of camera frames is patch-tokenized into one `[1, N, K, P^2]` tensor
//! and handed to a classifier that picks a label from a closed vocabulary.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> FrameTicker -> CaptureController -> PatchTokenizer -> BurstBuffer
//!                                      |                                   |
//!                                      +<-- Prediction <-- InferenceAdapter
//! ```
//!
//! The rules the pipeline holds by construction:
//!
//! 1. **Ordered bursts**: frames enter the tensor strictly in capture order, on
//!    the controller's thread only.
//! 2. **No partial submission**: a `BurstTensor` exists only once all N frames
//!    are in. An aborted burst is dropped whole.
//! 3. **Transient frames**: a frame lives for one tokenization call and is
//!    zeroed on drop. Pixels are never stored or logged.
//! 4. **Deterministic decode**: arg-max with first-index tie-break.
//!
//! # Module Structure
//!
//! - `frame`: Frame and CropRegion
//! - `ingest`: frame sources and the frame ticker
//! - `permission`: camera permission check
//! - `tokenize`: PatchTokenizer
//! - `burst`: BurstBuffer and BurstTensor
//! - `classify`: classifier backends, label vocabulary, InferenceAdapter
//! - `controller`: the capture state machine
//! - `runtime`: serialized event loop
//! - `config`: layered configuration
//! - `error`: PipelineError taxonomy

pub mod burst;
pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod permission;
pub mod runtime;
pub mod tokenize;

pub use burst::{BurstBuffer, BurstShape, BurstTensor};
#[cfg(feature = "backend-tract")]
pub use classify::TractClassifier;
pub use classify::{
    argmax, Classifier, ClassifierRegistry, InferenceAdapter, LabelVocabulary, Prediction,
    SharedClassifier, StubClassifier,
};
pub use config::PipelineConfig;
pub use controller::{
    CaptureController, CaptureObserver, CaptureSession, CaptureState, ControllerEvent,
    ControllerSettings, Flow,
};
pub use error::{ErrorClass, PipelineError};
pub use frame::{CropRegion, Frame};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{v4l2::V4l2Config, V4l2Source};
pub use ingest::{
    frame_from_raw, open_source, FrameControl, FrameSource, FrameTicker, ImageDirSource,
    PixelFormat, SourceSettings, SourceStats, SyntheticSource,
};
pub use permission::{CameraPermission, DevicePermission, PermissionStatus, StaticPermission};
pub use runtime::{PipelineRuntime, RunLimits, RunSummary, StopReason};
pub use tokenize::{PatchTokenizer, TokenizedFrame, TokenizerConfig};

/// N: frames per burst.
pub const DEFAULT_BURST_FRAMES: usize = 98;
/// Capture tick interval.
pub const DEFAULT_TICK_MS: u64 = 50;
/// R: square resize edge before patching.
pub const DEFAULT_RESIZE_EDGE: u32 = 64;
/// P: patch edge.
pub const DEFAULT_PATCH_EDGE: u32 = 16;
/// Center crop edge applied to camera frames.
pub const DEFAULT_CROP_EDGE: u32 = 200;
pub const DEFAULT_COOLDOWN_MS: u64 = 1_000;
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 3_000;
/// Longest gap between frames inside a burst.
pub const DEFAULT_WATCHDOG_MS: u64 = 2_000;
/// How long a pending camera permission may stay undecided.
pub const DEFAULT_PERMISSION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
pub const DEFAULT_SOURCE_URL: &str = "stub://gradient";
