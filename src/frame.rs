//! Captured frames and crop regions.
//!
//! - `Frame`: one RGB24 image from a frame source. Pixel bytes are private to the
//!   crate; the tokenizer is the only consumer and the frame is dropped right after.
//! - `CropRegion`: fixed-size, center-aligned rectangle applied before tokenization.

use anyhow::{anyhow, Result};
use image::RgbImage;
use zeroize::Zeroize;

use crate::error::PipelineError;

/// One captured RGB24 frame.
///
/// No `Clone`: a frame is owned by the pipeline for exactly one tokenization call.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Position in the source's capture order (1-based).
    pub sequence: u64,
}

impl Frame {
    /// Wrap an RGB24 pixel buffer. The length must be exactly `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence: 0,
        })
    }

    /// A frame where every pixel has the same RGB value.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::from_rgb(data, width, height)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Copy the pixels under `region` into an owned image.
    ///
    /// Returns `None` when the region leaves the frame bounds or the pixel
    /// buffer is shorter than the dimensions claim.
    pub(crate) fn crop_rgb(&self, region: CropRegion) -> Option<RgbImage> {
        if !region.fits(self.width, self.height) {
            return None;
        }
        let stride = self.width as usize * 3;
        let row_len = region.width as usize * 3;
        let mut out = Vec::with_capacity(row_len * region.height as usize);
        for y in region.y..region.y + region.height {
            let start = y as usize * stride + region.x as usize * 3;
            out.extend_from_slice(self.data.get(start..start + row_len)?);
        }
        RgbImage::from_raw(region.width, region.height, out)
    }

    /// The whole frame as a crop region.
    pub fn full_region(&self) -> CropRegion {
        CropRegion {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never printed.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Axis-aligned crop rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Center a `width` x `height` region inside a `frame_width` x `frame_height` frame.
    pub fn centered(
        frame_width: u32,
        frame_height: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 || width > frame_width || height > frame_height {
            return Err(PipelineError::TokenizationFailure(format!(
                "crop {}x{} does not fit frame {}x{}",
                width, height, frame_width, frame_height
            )));
        }
        Ok(Self {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        })
    }

    /// True when the region lies fully inside the frame bounds.
    pub fn fits(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self
                .x
                .checked_add(self.width)
                .is_some_and(|right| right <= frame_width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= frame_height)
    }
}
