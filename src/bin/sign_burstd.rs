//! sign_burstd - sign gesture recognition daemon
//!
//! This daemon:
//! 1. Loads configuration (defaults, JSON file, SIGN_BURST_* env, CLI flags)
//! 2. Loads the classifier backend
//! 3. Asks for camera permission, then prepares the frame source (the device
//!    is only opened when the first burst starts)
//! 4. Captures bursts of frames, tokenizes them, and classifies each burst
//! 5. Restarts after every cooldown until Ctrl-C or `--bursts` is reached

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sign_burst::{
    open_source, CaptureController, CaptureState, ClassifierRegistry, ControllerEvent,
    DevicePermission, FrameTicker, InferenceAdapter, PatchTokenizer, PipelineConfig,
    PipelineRuntime, RunLimits, StubClassifier,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "sign_burstd",
    version,
    about = "Capture frame bursts and classify sign gestures"
)]
struct Args {
    /// JSON config file (overrides SIGN_BURST_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frame source: stub://..., dir://<path>, or a device such as /dev/video0
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Classifier backend name (stub, tract)
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model path for the tract backend
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Exit after this many bursts have been classified
    #[arg(long)]
    bursts: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };
    log::info!(
        "sign_burstd {}: source {} ({}x{}, tick {:?}), burst {:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.source.width,
        cfg.source.height,
        cfg.source.tick,
        cfg.burst_shape().dims()
    );

    let adapter = {
        let _stage = ui.stage("Load classifier");
        build_adapter(&cfg)?
    };

    let runtime = PipelineRuntime::new();
    runtime.request_permission(
        Box::new(DevicePermission::new(cfg.source.url.clone())),
        cfg.timing.permission_timeout,
    )?;
    let ticker = {
        let _stage = ui.stage("Prepare frame source");
        let source = open_source(&cfg.source_settings())?;
        FrameTicker::spawn(source, cfg.source.tick, runtime.sender())?
    };

    let tokenizer = PatchTokenizer::new(cfg.tokenizer_config())?;
    let mut controller = CaptureController::new(
        cfg.controller_settings(),
        tokenizer,
        adapter,
        Box::new(ticker),
        Box::new(ui.observer(cfg.burst_frames)),
    );

    let shutdown = runtime.sender();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(ControllerEvent::Shutdown);
    })
    .context("install Ctrl-C handler")?;

    let summary = runtime.run(
        &mut controller,
        RunLimits {
            max_bursts: args.bursts,
        },
    )?;

    match &summary.last_outcome {
        Some(Ok(prediction)) => println!("last prediction: {}", prediction.label),
        Some(Err(err)) => println!("last result: {}", err),
        None => println!("no burst completed"),
    }
    if summary.final_state == CaptureState::Denied {
        return Err(anyhow!("camera permission denied for {}", cfg.source.url));
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load_from(Some(path.as_path()))?,
        None => PipelineConfig::load()?,
    };
    if let Some(source) = &args.source {
        cfg.source.url = source.clone();
    }
    if let Some(backend) = &args.backend {
        cfg.classifier.backend = Some(backend.clone());
    }
    if let Some(model) = &args.model {
        cfg.classifier.model_path = Some(model.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_adapter(cfg: &PipelineConfig) -> Result<InferenceAdapter> {
    let mut registry = ClassifierRegistry::new();
    registry.register(StubClassifier::new(cfg.labels.len()));
    register_model(&mut registry, cfg)?;

    let classifier = match registry.resolve(cfg.classifier.backend.as_deref()) {
        Ok(classifier) => Some(classifier),
        Err(err) => {
            log::warn!("sign_burstd: {:#}; bursts will report no classifier", err);
            None
        }
    };
    let adapter = InferenceAdapter::new(classifier, cfg.vocabulary(), cfg.burst_shape());
    if adapter.is_available() {
        if let Err(err) = adapter.warm_up() {
            log::warn!("sign_burstd: {}", err);
        }
    }
    Ok(adapter)
}

#[cfg(feature = "backend-tract")]
fn register_model(registry: &mut ClassifierRegistry, cfg: &PipelineConfig) -> Result<()> {
    if let Some(path) = &cfg.classifier.model_path {
        let backend = sign_burst::TractClassifier::new(path, cfg.burst_shape())?;
        registry.register(backend);
        if cfg.classifier.backend.is_none() {
            registry.prefer("tract")?;
        }
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model(_registry: &mut ClassifierRegistry, cfg: &PipelineConfig) -> Result<()> {
    if let Some(path) = &cfg.classifier.model_path {
        log::warn!(
            "sign_burstd: model {} ignored, built without the backend-tract feature",
            path.display()
        );
    }
    Ok(())
}
