//! Camera buffer normalization into `RgbFrame`.

use anyhow::{anyhow, Result};
use image::imageops;
use image::RgbImage;

use crate::frame::RgbFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Rgba8888,
    /// Y plane, then interleaved U/V at half resolution.
    Nv12,
    /// Y plane, then interleaved V/U at half resolution (Android camera default).
    Nv21,
}

/// A camera buffer as delivered by a capture API.
///
/// Packed formats use one plane. Semi-planar formats use either one contiguous
/// plane (Y followed by chroma) or two planes `[Y, chroma]`.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Vec<u8>>,
    /// Clockwise rotation needed to display the frame upright: 0, 90, 180 or 270.
    pub rotation_degrees: u32,
}

impl CameraFrame {
    pub fn packed(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            planes: vec![pixels],
            rotation_degrees: 0,
        }
    }

    pub fn with_rotation(mut self, rotation_degrees: u32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }
}

/// Convert a camera buffer into an upright RGB frame.
pub fn normalize(frame: &CameraFrame) -> Result<RgbFrame> {
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("camera frame dimensions must be non-zero"));
    }
    let rgb = match frame.format {
        PixelFormat::Rgb24 => packed_to_rgb(frame, 3)?,
        PixelFormat::Rgba8888 => packed_to_rgb(frame, 4)?,
        PixelFormat::Nv12 => semi_planar_to_rgb(frame, false)?,
        PixelFormat::Nv21 => semi_planar_to_rgb(frame, true)?,
    };
    let image = RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| anyhow!("converted buffer does not match {}x{}", frame.width, frame.height))?;
    let upright = match frame.rotation_degrees % 360 {
        0 => image,
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        other => return Err(anyhow!("unsupported rotation {} degrees", other)),
    };
    Ok(RgbFrame::from_image(upright))
}

fn pixel_count(frame: &CameraFrame) -> Result<usize> {
    (frame.width as usize)
        .checked_mul(frame.height as usize)
        .ok_or_else(|| anyhow!("camera frame dimensions overflow"))
}

fn packed_to_rgb(frame: &CameraFrame, bytes_per_pixel: usize) -> Result<Vec<u8>> {
    let [pixels] = frame.planes.as_slice() else {
        return Err(anyhow!(
            "{:?} frame expects 1 plane, got {}",
            frame.format,
            frame.planes.len()
        ));
    };
    let expected = pixel_count(frame)?
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| anyhow!("camera frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            frame.format,
            expected,
            pixels.len()
        ));
    }
    if bytes_per_pixel == 3 {
        return Ok(pixels.clone());
    }
    Ok(pixels
        .chunks_exact(bytes_per_pixel)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect())
}

fn semi_planar_to_rgb(frame: &CameraFrame, v_first: bool) -> Result<Vec<u8>> {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let y_len = pixel_count(frame)?;
    // Chroma rows hold one U/V pair per two columns, rounded up for odd widths.
    let chroma_stride = w.div_ceil(2) * 2;
    let chroma_len = chroma_stride * h.div_ceil(2);

    let (luma, chroma): (&[u8], &[u8]) = match frame.planes.as_slice() {
        [single] => {
            if single.len() != y_len + chroma_len {
                return Err(anyhow!(
                    "{:?} frame length mismatch: expected {}, got {}",
                    frame.format,
                    y_len + chroma_len,
                    single.len()
                ));
            }
            single.split_at(y_len)
        }
        [luma, chroma] => {
            if luma.len() != y_len || chroma.len() < chroma_len {
                return Err(anyhow!(
                    "{:?} plane sizes {}/{} do not fit {}x{}",
                    frame.format,
                    luma.len(),
                    chroma.len(),
                    w,
                    h
                ));
            }
            (luma.as_slice(), chroma.as_slice())
        }
        planes => {
            return Err(anyhow!(
                "{:?} frame expects 1 or 2 planes, got {}",
                frame.format,
                planes.len()
            ))
        }
    };

    let mut rgb = vec![0u8; y_len * 3];
    for j in 0..h {
        for i in 0..w {
            let y = luma[j * w + i] as f32;
            let uv_index = (j / 2) * chroma_stride + (i / 2) * 2;
            let (u, v) = if v_first {
                (chroma[uv_index + 1], chroma[uv_index])
            } else {
                (chroma[uv_index], chroma[uv_index + 1])
            };
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
