#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::tensor::RawDetectionTensor;
use crate::frame::RgbFrame;

pub(crate) type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Load an ONNX model with a fixed NCHW float input and prepare it for inference.
pub(crate) fn load_onnx_nchw(model_path: &Path, width: u32, height: u32) -> Result<OnnxPlan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// Build a `[1, 3, H, W]` tensor, applying `normalize(channel, value)` per sample.
pub(crate) fn nchw_input(image: &RgbImage, normalize: impl Fn(usize, u8) -> f32) -> Tensor {
    let (width, height) = image.dimensions();
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| normalize(channel, image.get_pixel(x as u32, y as u32)[channel]),
    )
    .into_tensor()
}

/// Tract-based detector for YOLO-style ONNX exports.
///
/// Expects one float input `[1, 3, H, W]` scaled to [0, 1] and a first output
/// shaped `[1, 4 + classes, anchors]` with normalized box geometry.
pub struct TractDetector {
    model: OnnxPlan,
    width: u32,
    height: u32,
}

impl TractDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = load_onnx_nchw(model_path, width, height)?;
        log::info!(
            "detector model loaded from {} ({}x{})",
            model_path.display(),
            width,
            height
        );
        Ok(Self {
            model,
            width,
            height,
        })
    }
}

impl DetectorBackend for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &RgbFrame) -> Result<RawDetectionTensor> {
        let resized = frame.resized(self.width, self.height);
        let input = nchw_input(&resized, |_, value| value as f32 / 255.0);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        RawDetectionTensor::new(view.shape(), view.iter().copied().collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbFrame::from_rgb(
            vec![0u8; (self.width * self.height * 3) as usize],
            self.width,
            self.height,
        )?;
        self.infer(&blank).map(|_| ())
    }
}
