use anyhow::Result;

use super::tensor::DepthTensor;
use crate::frame::RgbFrame;

/// Depth backend trait.
///
/// Produces an inverse-depth map for a full frame. Sampling and quantization
/// live in `DepthTensor` and `ScaleTable`.
pub trait DepthBackend: Send {
    fn name(&self) -> &'static str;

    fn estimate(&mut self, frame: &RgbFrame) -> Result<DepthTensor>;
}
