//! Burst buffer and tensor assembly.
//!
//! A burst is N tokenized frames stacked in capture order into a tensor of shape
//! `[1, N, K, P^2]`. `BurstBuffer` is the only way to build a `BurstTensor`, and it
//! only hands one out once all N frames are in, so a partially filled tensor
//! cannot reach the classifier.

use ndarray::{s, Array4, ArrayView2, ArrayView4};

use crate::error::PipelineError;
use crate::tokenize::{TokenizedFrame, TokenizerConfig};

/// Logical shape of a burst tensor (batch size is always 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BurstShape {
    pub frames: usize,
    pub patches: usize,
    pub patch_len: usize,
}

impl BurstShape {
    pub fn new(frames: usize, tokenizer: &TokenizerConfig) -> Self {
        Self {
            frames,
            patches: tokenizer.patches_per_frame(),
            patch_len: tokenizer.patch_len(),
        }
    }

    pub fn dims(&self) -> [usize; 4] {
        [1, self.frames, self.patches, self.patch_len]
    }

    pub fn len(&self) -> usize {
        self.frames * self.patches * self.patch_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BurstShape {
    fn default() -> Self {
        Self::new(crate::DEFAULT_BURST_FRAMES, &TokenizerConfig::default())
    }
}

/// Fully populated `[1, N, K, P^2]` tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct BurstTensor {
    data: Array4<f32>,
}

impl BurstTensor {
    pub fn dims(&self) -> [usize; 4] {
        let d = self.data.dim();
        [d.0, d.1, d.2, d.3]
    }

    pub fn shape(&self) -> BurstShape {
        let [_, frames, patches, patch_len] = self.dims();
        BurstShape {
            frames,
            patches,
            patch_len,
        }
    }

    /// Bounds-checked cell access.
    pub fn get(&self, frame: usize, patch: usize, sample: usize) -> Option<f32> {
        self.data.get((0, frame, patch, sample)).copied()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Cells in logical (row-major) order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Accumulates tokenized frames for one burst.
pub struct BurstBuffer {
    shape: BurstShape,
    data: Array4<f32>,
    count: usize,
}

impl BurstBuffer {
    pub fn new(shape: BurstShape) -> Self {
        Self {
            shape,
            data: Array4::zeros(shape.dims()),
            count: 0,
        }
    }

    pub fn shape(&self) -> BurstShape {
        self.shape
    }

    /// Frames accumulated so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.shape.frames
    }

    pub fn is_complete(&self) -> bool {
        self.count == self.shape.frames
    }

    /// Clear accumulated frames. Idempotent.
    pub fn reset(&mut self) {
        if self.count > 0 {
            self.data.fill(0.0);
        }
        self.count = 0;
    }

    /// Store `frame` at the next frame index. Returns the new count.
    ///
    /// On error the buffer is left untouched.
    pub fn append(&mut self, frame: &TokenizedFrame) -> Result<usize, PipelineError> {
        if self.is_complete() {
            return Err(PipelineError::BurstOverflow {
                capacity: self.shape.frames,
            });
        }
        if frame.patch_count() != self.shape.patches || frame.patch_len() != self.shape.patch_len
        {
            return Err(PipelineError::shape(
                "burst append",
                &[self.shape.patches, self.shape.patch_len],
                &[frame.patch_count(), frame.patch_len()],
            ));
        }
        let src = ArrayView2::from_shape(
            (self.shape.patches, self.shape.patch_len),
            frame.as_slice(),
        )
        .map_err(|_| {
            PipelineError::shape(
                "burst append",
                &[self.shape.patches * self.shape.patch_len],
                &[frame.as_slice().len()],
            )
        })?;
        self.data.slice_mut(s![0, self.count, .., ..]).assign(&src);
        self.count += 1;
        Ok(self.count)
    }

    /// Hand out the assembled tensor and leave the buffer empty.
    ///
    /// Fails without side effects if fewer than N frames are stored.
    pub fn finalize(&mut self) -> Result<BurstTensor, PipelineError> {
        if !self.is_complete() {
            return Err(PipelineError::BurstIncomplete {
                captured: self.count,
                target: self.shape.frames,
            });
        }
        let data = std::mem::replace(&mut self.data, Array4::zeros(self.shape.dims()));
        self.count = 0;
        Ok(BurstTensor { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_shape() -> BurstShape {
        BurstShape {
            frames: 3,
            patches: 2,
            patch_len: 4,
        }
    }

    fn frame_of(value: f32) -> TokenizedFrame {
        TokenizedFrame::from_patches(vec![vec![value; 4], vec![value + 0.5; 4]]).unwrap()
    }

    #[test]
    fn default_shape_matches_model_input() {
        assert_eq!(BurstShape::default().dims(), [1, 98, 16, 256]);
    }

    #[test]
    fn n_appends_complete_the_burst() {
        let mut buf = BurstBuffer::new(small_shape());
        for i in 0..3 {
            assert!(!buf.is_complete());
            assert_eq!(buf.append(&frame_of(i as f32 * 0.1)).unwrap(), i + 1);
        }
        assert!(buf.is_complete());
    }

    #[test]
    fn overflow_does_not_mutate_stored_frames() {
        let mut buf = BurstBuffer::new(small_shape());
        for _ in 0..3 {
            buf.append(&frame_of(0.25)).unwrap();
        }
        let err = buf.append(&frame_of(0.0)).unwrap_err();
        assert_eq!(err, PipelineError::BurstOverflow { capacity: 3 });
        assert_eq!(buf.len(), 3);

        let tensor = buf.finalize().unwrap();
        assert_eq!(tensor.get(2, 0, 0), Some(0.25));
        assert_eq!(tensor.get(2, 1, 3), Some(0.75));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut buf = BurstBuffer::new(small_shape());
        let wrong = TokenizedFrame::from_patches(vec![vec![0.0; 4]]).unwrap();
        assert!(matches!(
            buf.append(&wrong),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn finalize_before_completion_fails() {
        let mut buf = BurstBuffer::new(small_shape());
        buf.append(&frame_of(0.1)).unwrap();
        assert_eq!(
            buf.finalize().unwrap_err(),
            PipelineError::BurstIncomplete {
                captured: 1,
                target: 3
            }
        );
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn frames_land_in_capture_order() {
        let mut buf = BurstBuffer::new(small_shape());
        buf.append(&frame_of(0.0)).unwrap();
        buf.append(&frame_of(0.1)).unwrap();
        buf.append(&frame_of(0.2)).unwrap();
        let tensor = buf.finalize().unwrap();

        assert_eq!(tensor.dims(), [1, 3, 2, 4]);
        assert_eq!(tensor.get(0, 0, 0), Some(0.0));
        assert_eq!(tensor.get(1, 0, 0), Some(0.1));
        assert_eq!(tensor.get(2, 0, 0), Some(0.2));
        assert_eq!(tensor.get(3, 0, 0), None);
        assert_eq!(tensor.get(0, 2, 0), None);
        assert_eq!(tensor.to_vec().len(), small_shape().len());
    }

    #[test]
    fn finalize_leaves_buffer_empty() {
        let mut buf = BurstBuffer::new(small_shape());
        for _ in 0..3 {
            buf.append(&frame_of(0.9)).unwrap();
        }
        buf.finalize().unwrap();
        assert!(buf.is_empty());
        assert!(buf.finalize().is_err());
    }

    #[test]
    fn reset_is_idempotent_and_clears_cells() {
        let mut buf = BurstBuffer::new(small_shape());
        buf.append(&frame_of(0.7)).unwrap();
        buf.reset();
        buf.reset();
        assert!(buf.is_empty());

        for _ in 0..3 {
            buf.append(&frame_of(0.1)).unwrap();
        }
        let tensor = buf.finalize().unwrap();
        let upper = 0.1_f32 + 0.5;
        assert!(tensor.view().iter().all(|&v| v == 0.1 || v == upper));
    }
}
