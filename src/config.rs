use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::burst::BurstShape;
use crate::classify::LabelVocabulary;
use crate::controller::ControllerSettings;
use crate::frame::CropRegion;
use crate::ingest::SourceSettings;
use crate::tokenize::TokenizerConfig;

pub const CONFIG_ENV: &str = "SIGN_BURST_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    source: Option<SourceConfigFile>,
    tokenizer: Option<TokenizerConfigFile>,
    burst: Option<BurstConfigFile>,
    timing: Option<TimingConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    labels: Option<Vec<String>>,
    auto_restart: Option<bool>,
    strict_shapes: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    tick_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TokenizerConfigFile {
    resize_edge: Option<u32>,
    patch_edge: Option<u32>,
    crop_width: Option<u32>,
    crop_height: Option<u32>,
    center_crop: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BurstConfigFile {
    frames: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TimingConfigFile {
    cooldown_ms: Option<u64>,
    startup_delay_ms: Option<u64>,
    watchdog_ms: Option<u64>,
    permission_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
}

/// Fully resolved pipeline configuration.
///
/// Layering: built-in defaults, then the JSON file named by
/// `SIGN_BURST_CONFIG`, then `SIGN_BURST_*` environment overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub tokenizer: TokenizerConfig,
    pub burst_frames: usize,
    pub timing: TimingSettings,
    pub classifier: ClassifierSettings,
    pub labels: LabelVocabulary,
    pub auto_restart: bool,
    pub strict_shapes: bool,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub tick: Duration,
}

#[derive(Debug, Clone)]
pub struct TimingSettings {
    pub cooldown: Duration,
    pub startup_delay: Duration,
    pub watchdog: Duration,
    pub permission_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierSettings {
    /// Registered backend name; `None` picks the registry default.
    pub backend: Option<String>,
    pub model_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file instead of `SIGN_BURST_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source
                .url
                .unwrap_or_else(|| crate::DEFAULT_SOURCE_URL.to_string()),
            width: source.width.unwrap_or(crate::DEFAULT_FRAME_WIDTH),
            height: source.height.unwrap_or(crate::DEFAULT_FRAME_HEIGHT),
            tick: Duration::from_millis(source.tick_ms.unwrap_or(crate::DEFAULT_TICK_MS)),
        };

        let tokenizer_file = file.tokenizer.unwrap_or_default();
        let defaults = TokenizerConfig::default();
        let crop = if tokenizer_file.center_crop.unwrap_or(true) {
            Some((
                tokenizer_file.crop_width.unwrap_or(crate::DEFAULT_CROP_EDGE),
                tokenizer_file
                    .crop_height
                    .unwrap_or(crate::DEFAULT_CROP_EDGE),
            ))
        } else {
            None
        };
        let tokenizer = TokenizerConfig {
            resize_edge: tokenizer_file.resize_edge.unwrap_or(defaults.resize_edge),
            patch_edge: tokenizer_file.patch_edge.unwrap_or(defaults.patch_edge),
            crop,
        };

        let timing = file.timing.unwrap_or_default();
        let timing = TimingSettings {
            cooldown: Duration::from_millis(
                timing.cooldown_ms.unwrap_or(crate::DEFAULT_COOLDOWN_MS),
            ),
            startup_delay: Duration::from_millis(
                timing
                    .startup_delay_ms
                    .unwrap_or(crate::DEFAULT_STARTUP_DELAY_MS),
            ),
            watchdog: Duration::from_millis(
                timing.watchdog_ms.unwrap_or(crate::DEFAULT_WATCHDOG_MS),
            ),
            permission_timeout: Duration::from_millis(
                timing
                    .permission_timeout_ms
                    .unwrap_or(crate::DEFAULT_PERMISSION_TIMEOUT_MS),
            ),
        };

        let classifier = file
            .classifier
            .map(|c| ClassifierSettings {
                backend: c.backend,
                model_path: c.model_path,
            })
            .unwrap_or_default();

        let labels = match file.labels {
            Some(labels) => LabelVocabulary::from_ordered(labels)?,
            None => LabelVocabulary::standard(),
        };

        Ok(Self {
            source,
            tokenizer,
            burst_frames: file
                .burst
                .and_then(|burst| burst.frames)
                .unwrap_or(crate::DEFAULT_BURST_FRAMES),
            timing,
            classifier,
            labels,
            auto_restart: file.auto_restart.unwrap_or(true),
            strict_shapes: file.strict_shapes.unwrap_or(cfg!(debug_assertions)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SIGN_BURST_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("SIGN_BURST_BACKEND") {
            if !backend.trim().is_empty() {
                self.classifier.backend = Some(backend);
            }
        }
        if let Ok(model) = std::env::var("SIGN_BURST_MODEL") {
            if !model.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(model));
            }
        }
        if let Some(cooldown) = env_millis("SIGN_BURST_COOLDOWN_MS")? {
            self.timing.cooldown = cooldown;
        }
        if let Some(delay) = env_millis("SIGN_BURST_STARTUP_DELAY_MS")? {
            self.timing.startup_delay = delay;
        }
        if let Some(watchdog) = env_millis("SIGN_BURST_WATCHDOG_MS")? {
            self.timing.watchdog = watchdog;
        }
        if let Some(timeout) = env_millis("SIGN_BURST_PERMISSION_TIMEOUT_MS")? {
            self.timing.permission_timeout = timeout;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.tokenizer.validate()?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("frame size must be non-zero"));
        }
        if let Some((w, h)) = self.tokenizer.crop {
            CropRegion::centered(self.source.width, self.source.height, w, h)?;
        }
        if self.burst_frames == 0 {
            return Err(anyhow!("burst length must be greater than zero"));
        }
        if self.source.tick.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        if self.timing.watchdog <= self.source.tick {
            return Err(anyhow!(
                "watchdog ({:?}) must be longer than the tick interval ({:?})",
                self.timing.watchdog,
                self.source.tick
            ));
        }
        if self.timing.permission_timeout.is_zero() {
            return Err(anyhow!("permission timeout must be greater than zero"));
        }
        if self.labels.is_empty() {
            return Err(anyhow!("label vocabulary must not be empty"));
        }
        Ok(())
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            url: self.source.url.clone(),
            width: self.source.width,
            height: self.source.height,
        }
    }

    pub fn tokenizer_config(&self) -> TokenizerConfig {
        self.tokenizer
    }

    pub fn burst_shape(&self) -> BurstShape {
        BurstShape::new(self.burst_frames, &self.tokenizer)
    }

    pub fn vocabulary(&self) -> LabelVocabulary {
        self.labels.clone()
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            burst_frames: self.burst_frames,
            cooldown: self.timing.cooldown,
            startup_delay: self.timing.startup_delay,
            watchdog: self.timing.watchdog,
            permission_timeout: self.timing.permission_timeout,
            auto_restart: self.auto_restart,
            strict_shapes: self.strict_shapes,
        }
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        _ => Ok(None),
    }
}
