//! Frame sources.
//!
//! This module provides the camera side of the pipeline:
//! - Synthetic `stub://` sources (tests, demos, abort drills)
//! - Image directory replay via `dir://` (offline evaluation)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - `FrameTicker`, which polls a source at the capture interval and marshals
//!   frames onto the controller's event channel
//!
//! Sources produce RGB24 `Frame`s at the configured size. They MUST NOT:
//! - Store frames to disk
//! - Log pixel content

mod normalize;
pub(crate) mod replay;
pub(crate) mod synthetic;
pub mod ticker;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use normalize::{frame_from_raw, PixelFormat};
pub use replay::ImageDirSource;
pub use synthetic::SyntheticSource;
pub use ticker::{FrameControl, FrameTicker};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Camera-like producer of frames.
pub trait FrameSource: Send {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub location: String,
}

/// Where frames come from and what size they are delivered at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://...`, `dir://<path>`, or a device path such as `/dev/video0`.
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_SOURCE_URL.to_string(),
            width: crate::DEFAULT_FRAME_WIDTH,
            height: crate::DEFAULT_FRAME_HEIGHT,
        }
    }
}

/// Build (but do not connect) the source named by `settings.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with(synthetic::SCHEME) {
        return Ok(Box::new(SyntheticSource::new(settings.clone())?));
    }
    if let Some(path) = url.strip_prefix(replay::SCHEME) {
        return Ok(Box::new(ImageDirSource::new(
            path,
            settings.width,
            settings.height,
        )?));
    }
    if url.contains("://") {
        return Err(anyhow!("unsupported frame source scheme in '{}'", url));
    }
    open_device(settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(v4l2::V4l2Config {
        device: settings.url.clone(),
        width: settings.width,
        height: settings.height,
        ..v4l2::V4l2Config::default()
    })?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "device capture from {} requires the ingest-v4l2 feature",
        settings.url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_sources() -> Result<()> {
        let mut source = open_source(&SourceSettings {
            url: "stub://gray/128".into(),
            width: 32,
            height: 24,
        })?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width, frame.height), (32, 24));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        let settings = SourceSettings {
            url: "rtsp://camera".into(),
            ..SourceSettings::default()
        };
        assert!(open_source(&settings).is_err());
    }
}
