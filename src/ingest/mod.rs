//! Frame ingestion sources.
//!
//! This module provides different sources for camera frames:
//! - Synthetic camera (`stub://` URLs, demos and tests)
//! - Directory of still images (`dir://` URLs or plain directory paths)
//!
//! Sources produce either normalized `RgbFrame`s or raw `CameraFrame` buffers;
//! the latter are converted by `normalize` on the worker thread.
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the worker

mod image_dir;
mod normalize;
mod synthetic;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::RgbFrame;

pub use image_dir::ImageDirSource;
pub use normalize::{normalize, CameraFrame, PixelFormat};
pub use synthetic::SyntheticSource;

/// A frame as handed to the worker.
#[derive(Clone, Debug)]
pub enum FrameInput {
    Rgb(RgbFrame),
    Camera(CameraFrame),
}

impl FrameInput {
    /// Convert to an upright RGB frame.
    pub fn into_rgb(self) -> Result<RgbFrame> {
        match self {
            FrameInput::Rgb(frame) => Ok(frame),
            FrameInput::Camera(frame) => normalize(&frame),
        }
    }
}

impl From<RgbFrame> for FrameInput {
    fn from(frame: RgbFrame) -> Self {
        FrameInput::Rgb(frame)
    }
}

impl From<CameraFrame> for FrameInput {
    fn from(frame: CameraFrame) -> Self {
        FrameInput::Camera(frame)
    }
}

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL (e.g., "stub://camera" or "dir:///data/frames")
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Frame width (synthetic frames only).
    pub width: u32,
    /// Frame height (synthetic frames only).
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 5,
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    fn next_frame(&mut self) -> Result<FrameInput>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    let path = config.url.strip_prefix("dir://").unwrap_or(&config.url);
    if Path::new(path).is_dir() {
        return Ok(Box::new(ImageDirSource::new(path)));
    }
    Err(anyhow!(
        "unsupported frame source '{}' (expected stub:// or an image directory)",
        config.url
    ))
}
