//! Synthetic frame source.
//!
//! URL forms:
//! - `stub://gray/<level>`: every pixel is (level, level, level)
//! - `stub://gradient`: a diagonal gradient that shifts by one step per frame
//! - `stub://fail-every/<n>`: gradient frames, but every n-th capture fails
//!
//! Anything else under `stub://` falls back to the gradient so that demo
//! configs like `stub://camera` keep working.

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::Frame;

pub(crate) const SCHEME: &str = "stub://";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pattern {
    Gray(u8),
    Gradient,
    FailEvery(u64),
}

pub struct SyntheticSource {
    settings: SourceSettings,
    pattern: Pattern,
    frame_count: u64,
    failures: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let rest = settings
            .url
            .strip_prefix(SCHEME)
            .ok_or_else(|| anyhow!("synthetic source URL must start with {}", SCHEME))?;
        let pattern = parse_pattern(rest)?;
        Ok(Self {
            settings,
            pattern,
            frame_count: 0,
            failures: 0,
            connected: false,
        })
    }

    /// Captures that failed on purpose.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        match self.pattern {
            Pattern::Gray(level) => vec![level; width * height * 3],
            Pattern::Gradient | Pattern::FailEvery(_) => {
                let mut pixels = Vec::with_capacity(width * height * 3);
                for y in 0..height {
                    for x in 0..width {
                        let v = ((x + y + self.frame_count as usize) % 256) as u8;
                        pixels.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170)]);
                    }
                }
                pixels
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.settings.url,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.settings.url));
        }
        self.frame_count += 1;

        if let Pattern::FailEvery(n) = self.pattern {
            if self.frame_count % n == 0 {
                self.failures += 1;
                return Err(anyhow!(
                    "synthetic capture failure at frame {}",
                    self.frame_count
                ));
            }
        }

        let pixels = self.generate_pixels();
        Ok(Frame::from_rgb(pixels, self.settings.width, self.settings.height)?
            .with_sequence(self.frame_count))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            location: self.settings.url.clone(),
        }
    }
}

fn parse_pattern(rest: &str) -> Result<Pattern> {
    let mut parts = rest.splitn(2, '/');
    let kind = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (kind, arg) {
        ("gray", Some(level)) => Ok(Pattern::Gray(
            level
                .parse()
                .with_context(|| format!("invalid gray level '{}'", level))?,
        )),
        ("gray", None) => Ok(Pattern::Gray(128)),
        ("fail-every", Some(n)) => {
            let n: u64 = n
                .parse()
                .with_context(|| format!("invalid failure interval '{}'", n))?;
            if n == 0 {
                return Err(anyhow!("failure interval must be greater than zero"));
            }
            Ok(Pattern::FailEvery(n))
        }
        ("fail-every", None) => Err(anyhow!("stub://fail-every needs an interval")),
        _ => Ok(Pattern::Gradient),
    }
}
