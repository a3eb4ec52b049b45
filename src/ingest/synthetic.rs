use anyhow::Result;

use super::normalize::{CameraFrame, PixelFormat};
use super::{FrameInput, FrameSource, SourceConfig, SourceStats};

/// Synthetic camera for `stub://` URLs.
///
/// Emits NV21 buffers (the format most phone cameras deliver) carrying a
/// moving luma gradient, so the whole normalize path is exercised.
pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn generate_nv21(&self) -> Vec<u8> {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let chroma_len = w.div_ceil(2) * 2 * h.div_ceil(2);
        let mut pixels = vec![128u8; w * h + chroma_len];
        for (i, pixel) in pixels[..w * h].iter_mut().enumerate() {
            *pixel = ((i % w) as u64 + self.frame_count).wrapping_mul(3) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {} (synthetic)", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<FrameInput> {
        self.frame_count += 1;
        let frame = CameraFrame::packed(
            self.config.width,
            self.config.height,
            PixelFormat::Nv21,
            self.generate_nv21(),
        );
        Ok(frame.into())
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
