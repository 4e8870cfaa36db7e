//! Patch tokenizer.
//!
//! Turns one frame into the model's per-frame token block:
//! crop (optional) -> resize to R x R -> grayscale -> (R/P)^2 patches of P x P
//! samples -> normalize to [0, 1].
//!
//! Patch order is row-major over the patch grid, and samples inside a patch are
//! row-major too. The model was trained on exactly this layout.

use image::imageops::{self, FilterType};

use crate::error::PipelineError;
use crate::frame::{CropRegion, Frame};

/// Tokenizer geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Edge length R of the square resize target.
    pub resize_edge: u32,
    /// Edge length P of one patch. Must divide `resize_edge`.
    pub patch_edge: u32,
    /// Center crop (width, height) applied before resizing.
    pub crop: Option<(u32, u32)>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            resize_edge: crate::DEFAULT_RESIZE_EDGE,
            patch_edge: crate::DEFAULT_PATCH_EDGE,
            crop: Some((crate::DEFAULT_CROP_EDGE, crate::DEFAULT_CROP_EDGE)),
        }
    }
}

impl TokenizerConfig {
    /// Patches per axis.
    pub fn grid(&self) -> usize {
        (self.resize_edge / self.patch_edge) as usize
    }

    /// K: patches per frame.
    pub fn patches_per_frame(&self) -> usize {
        self.grid() * self.grid()
    }

    /// P^2: samples per patch.
    pub fn patch_len(&self) -> usize {
        (self.patch_edge as usize) * (self.patch_edge as usize)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.patch_edge == 0 || self.resize_edge == 0 {
            return Err(PipelineError::TokenizationFailure(
                "resize and patch edges must be non-zero".into(),
            ));
        }
        if self.resize_edge % self.patch_edge != 0 {
            return Err(PipelineError::TokenizationFailure(format!(
                "resize edge {} is not a multiple of patch edge {}",
                self.resize_edge, self.patch_edge
            )));
        }
        if let Some((w, h)) = self.crop {
            if w == 0 || h == 0 {
                return Err(PipelineError::TokenizationFailure(
                    "crop dimensions must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// One frame as K patches of P^2 normalized samples, stored contiguously.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenizedFrame {
    values: Vec<f32>,
    patch_count: usize,
    patch_len: usize,
}

impl TokenizedFrame {
    /// Build from explicit patches. All patches must have the same length.
    pub fn from_patches(patches: Vec<Vec<f32>>) -> Result<Self, PipelineError> {
        let patch_len = patches.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = patches.iter().find(|p| p.len() != patch_len) {
            return Err(PipelineError::shape(
                "tokenized frame",
                &[patch_len],
                &[bad.len()],
            ));
        }
        let patch_count = patches.len();
        Ok(Self {
            values: patches.into_iter().flatten().collect(),
            patch_count,
            patch_len,
        })
    }

    pub fn patch_count(&self) -> usize {
        self.patch_count
    }

    pub fn patch_len(&self) -> usize {
        self.patch_len
    }

    /// Patch `index` in row-major grid order.
    pub fn patch(&self, index: usize) -> Option<&[f32]> {
        if index >= self.patch_count {
            return None;
        }
        let start = index * self.patch_len;
        self.values.get(start..start + self.patch_len)
    }

    pub fn patches(&self) -> impl Iterator<Item = &[f32]> {
        // patch_len of 0 only happens for an empty frame; chunks_exact(0) would panic.
        self.values.chunks_exact(self.patch_len.max(1))
    }

    /// All samples, patch-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Stateless tokenizer; `tokenize` is a pure function of the frame.
#[derive(Clone, Debug)]
pub struct PatchTokenizer {
    config: TokenizerConfig,
    filter: FilterType,
}

impl PatchTokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            filter: FilterType::Lanczos3,
        })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn tokenize(&self, frame: &Frame) -> Result<TokenizedFrame, PipelineError> {
        let region = match self.config.crop {
            Some((w, h)) => CropRegion::centered(frame.width, frame.height, w, h)?,
            None => frame.full_region(),
        };
        let cropped = frame.crop_rgb(region).ok_or_else(|| {
            PipelineError::TokenizationFailure(format!(
                "missing pixel data for crop {:?} of frame #{}",
                region, frame.sequence
            ))
        })?;

        let edge = self.config.resize_edge;
        let resized = imageops::resize(&cropped, edge, edge, self.filter);
        if resized.dimensions() != (edge, edge) {
            return Err(PipelineError::TokenizationFailure(format!(
                "resize produced {:?}, expected {}x{}",
                resized.dimensions(),
                edge,
                edge
            )));
        }

        let gray: Vec<u8> = resized
            .pixels()
            .map(|px| {
                let [r, g, b] = px.0;
                ((r as u16 + g as u16 + b as u16) / 3) as u8
            })
            .collect();

        let values = patchify(&gray, edge as usize, self.config.patch_edge as usize);
        Ok(TokenizedFrame {
            values,
            patch_count: self.config.patches_per_frame(),
            patch_len: self.config.patch_len(),
        })
    }
}

/// Split a row-major `edge` x `edge` grayscale grid into patches and normalize.
///
/// `edge` must be a multiple of `patch`, which `TokenizerConfig::validate` enforces.
fn patchify(gray: &[u8], edge: usize, patch: usize) -> Vec<f32> {
    let grid = edge / patch;
    let mut out = Vec::with_capacity(edge * edge);
    for row in 0..grid {
        for col in 0..grid {
            for y in 0..patch {
                let line = (row * patch + y) * edge + col * patch;
                out.extend(gray[line..line + patch].iter().map(|&v| v as f32 / 255.0));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> PatchTokenizer {
        PatchTokenizer::new(TokenizerConfig::default()).unwrap()
    }

    #[test]
    fn default_geometry_is_16_patches_of_256() {
        let cfg = TokenizerConfig::default();
        assert_eq!(cfg.grid(), 4);
        assert_eq!(cfg.patches_per_frame(), 16);
        assert_eq!(cfg.patch_len(), 256);
    }

    #[test]
    fn rejects_resize_edge_not_multiple_of_patch() {
        let cfg = TokenizerConfig {
            resize_edge: 60,
            patch_edge: 16,
            crop: None,
        };
        assert!(matches!(
            PatchTokenizer::new(cfg),
            Err(PipelineError::TokenizationFailure(_))
        ));
    }

    #[test]
    fn vga_frame_yields_k_patches_in_unit_range() {
        let mut data = Vec::with_capacity(640 * 480 * 3);
        for i in 0..(640 * 480 * 3) {
            data.push((i % 251) as u8);
        }
        let frame = Frame::from_rgb(data, 640, 480).unwrap();
        let tokens = tokenizer().tokenize(&frame).unwrap();

        assert_eq!(tokens.patch_count(), 16);
        assert_eq!(tokens.patch_len(), 256);
        assert_eq!(tokens.patches().count(), 16);
        assert!(tokens.patches().all(|p| p.len() == 256));
        assert!(tokens.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn solid_gray_normalizes_to_128_over_255() {
        let frame = Frame::solid(640, 480, [128, 128, 128]).unwrap();
        let tokens = tokenizer().tokenize(&frame).unwrap();
        let expected = 128.0_f32 / 255.0;
        assert!(tokens.as_slice().iter().all(|&v| v == expected));
    }

    #[test]
    fn grayscale_is_channel_mean() {
        let frame = Frame::solid(64, 64, [30, 60, 90]).unwrap();
        let cfg = TokenizerConfig {
            resize_edge: 64,
            patch_edge: 16,
            crop: None,
        };
        let tokens = PatchTokenizer::new(cfg).unwrap().tokenize(&frame).unwrap();
        assert!(tokens.as_slice().iter().all(|&v| v == 60.0 / 255.0));
    }

    #[test]
    fn crop_larger_than_frame_fails() {
        let frame = Frame::solid(100, 100, [0, 0, 0]).unwrap();
        assert!(matches!(
            tokenizer().tokenize(&frame),
            Err(PipelineError::TokenizationFailure(_))
        ));
    }

    #[test]
    fn patchify_is_row_major_over_grid_and_within_patch() {
        // 4x4 grid, 2x2 patches; value = row * 4 + col.
        let gray: Vec<u8> = (0..16).collect();
        let out = patchify(&gray, 4, 2);
        let as_u8: Vec<u8> = out.iter().map(|v| (v * 255.0).round() as u8).collect();
        assert_eq!(
            as_u8,
            vec![
                0, 1, 4, 5, // patch (0,0)
                2, 3, 6, 7, // patch (0,1)
                8, 9, 12, 13, // patch (1,0)
                10, 11, 14, 15, // patch (1,1)
            ]
        );
    }

    #[test]
    fn swapping_rows_changes_output_deterministically() {
        let gray: Vec<u8> = (0..16).collect();
        let mut swapped = gray.clone();
        let (top, bottom) = swapped.split_at_mut(8);
        top.swap_with_slice(bottom);

        let a = patchify(&gray, 4, 2);
        let b = patchify(&swapped, 4, 2);
        assert_ne!(a, b);
        assert_eq!(b, patchify(&swapped, 4, 2));
        assert_eq!(&b[0..4], &a[8..12]);
    }

    #[test]
    fn tokenized_frame_from_patches_checks_lengths() {
        assert!(TokenizedFrame::from_patches(vec![vec![0.0; 4], vec![0.0; 4]]).is_ok());
        assert!(matches!(
            TokenizedFrame::from_patches(vec![vec![0.0; 4], vec![0.0; 3]]),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        let frame = TokenizedFrame::from_patches(vec![vec![0.1; 2], vec![0.2; 2]]).unwrap();
        assert_eq!(frame.patch(1), Some(&[0.2, 0.2][..]));
        assert_eq!(frame.patch(2), None);
    }
}
