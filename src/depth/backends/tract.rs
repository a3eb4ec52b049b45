#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::depth::backend::DepthBackend;
use crate::depth::tensor::DepthTensor;
use crate::detect::backends::tract::{load_onnx_nchw, nchw_input, OnnxPlan};
use crate::frame::RgbFrame;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Tract-based monocular depth (MiDaS-style) model.
///
/// Input is a square RGB frame normalized with ImageNet mean and std; the
/// first output is an inverse-depth map.
pub struct TractDepth {
    model: OnnxPlan,
    input_size: u32,
}

impl TractDepth {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = load_onnx_nchw(model_path, input_size, input_size)?;
        log::info!(
            "depth model loaded from {} ({}x{})",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }
}

impl DepthBackend for TractDepth {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn estimate(&mut self, frame: &RgbFrame) -> Result<DepthTensor> {
        let resized = frame.resized(self.input_size, self.input_size);
        let input = nchw_input(&resized, |channel, value| {
            (value as f32 / 255.0 - MEAN[channel]) / STD[channel]
        });
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("depth inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("depth model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("depth output tensor was not f32")?;
        DepthTensor::new(view.shape(), view.iter().copied().collect())
    }
}
