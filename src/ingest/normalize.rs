use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Raw camera buffer layouts accepted by `frame_from_raw`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, two pixels per `Y0 U Y1 V` quad.
    Yuyv,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a supported layout.
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// Convert a raw camera buffer to an RGB24 `Frame`.
pub fn frame_from_raw(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Frame> {
    let rgb = match format {
        PixelFormat::Rgb24 => {
            expect_len(pixels, pixel_count(width, height)?.checked_mul(3), "RGB")?;
            pixels.to_vec()
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height)?,
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height)?,
    };
    Frame::from_rgb(rgb, width, height)
}

fn pixel_count(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn expect_len(pixels: &[u8], expected: Option<usize>, what: &str) -> Result<()> {
    let expected = expected.ok_or_else(|| anyhow!("{} frame dimensions overflow", what))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            what,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    let count = pixel_count(width, height)?;
    expect_len(pixels, count.checked_mul(2), "YUYV")?;

    let mut rgb = Vec::with_capacity(count * 3);
    for quad in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = pixel_count(width, height)?;
    expect_len(pixels, y_plane.checked_add(y_plane / 2), "NV12")?;

    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            rgb.extend_from_slice(&yuv_to_rgb(
                pixels[j * w + i],
                pixels[uv_index],
                pixels[uv_index + 1],
            ));
        }
    }
    Ok(rgb)
}

/// BT.601 full-range conversion.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_of(frame: &Frame) -> Vec<u8> {
        frame.crop_rgb(frame.full_region()).unwrap().into_raw()
    }

    #[test]
    fn nv12_neutral_chroma_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let frame = frame_from_raw(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb_of(&frame), vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_neutral_chroma_keeps_luma() -> Result<()> {
        let yuyv = [50u8, 128, 200, 128];
        let frame = frame_from_raw(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb_of(&frame), vec![50, 50, 50, 200, 200, 200]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() {
        assert!(frame_from_raw(&[1u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
        assert!(frame_from_raw(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(frame_from_raw(&[1u8; 6], 3, 1, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
