//! Normalized RGB frames.
//!
//! `RgbFrame` is the only raster type the pipeline consumes:
//!
//! - Camera buffers are converted into it by `ingest::normalize`.
//! - Detector and depth backends read it (resized to their model input).
//! - The aggregator crops per-box regions out of it for text recognition.
//!
//! Frames are produced and consumed within one frame cycle and never retained
//! by the pipeline beyond that.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::time::{Duration, Instant};

use crate::detect::BoundingBox;

/// An 8-bit RGB raster plus the frame's position in the stream.
#[derive(Clone, Debug)]
pub struct RgbFrame {
    image: RgbImage,
    sequence: u64,
    captured_at: Instant,
}

impl RgbFrame {
    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Stamp the frame with its position in the stream.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Time since the frame was captured or normalized.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// The frame scaled to a model's fixed input size.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        if self.width() == width && self.height() == height {
            return self.image.clone();
        }
        imageops::resize(&self.image, width, height, FilterType::Triangle)
    }

    /// Crop the region covered by a normalized box.
    ///
    /// Corners are truncated to whole pixels and clamped to the frame. Returns
    /// `None` when the clamped region has no area.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbFrame> {
        let width = self.width() as f32;
        let height = self.height() as f32;

        // `as u32` saturates: negative corners land on 0.
        let left = (bbox.x1 * width) as u32;
        let top = (bbox.y1 * height) as u32;
        let right = ((bbox.x2 * width) as u32).min(self.width());
        let bottom = ((bbox.y2 * height) as u32).min(self.height());

        if right <= left || bottom <= top {
            return None;
        }

        let region = imageops::crop_imm(&self.image, left, top, right - left, bottom - top);
        Some(RgbFrame {
            image: region.to_image(),
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }
}
