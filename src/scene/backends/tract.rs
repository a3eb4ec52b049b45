#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops;
use tract_onnx::prelude::*;

use crate::detect::backends::tract::{load_onnx_nchw, nchw_input, OnnxPlan};
use crate::frame::RgbFrame;
use crate::scene::backend::SceneBackend;

const RESIZE: u32 = 256;
const CROP: u32 = 224;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Tract-based Places365-style scene classifier.
///
/// The frame is resized to 256x256, center-cropped to 224x224 and normalized
/// with ImageNet mean and std. The first output holds one logit per class.
pub struct TractScene {
    model: OnnxPlan,
}

impl TractScene {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = load_onnx_nchw(model_path, CROP, CROP)?;
        log::info!("scene model loaded from {}", model_path.display());
        Ok(Self { model })
    }
}

impl SceneBackend for TractScene {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &RgbFrame) -> Result<Vec<f32>> {
        let resized = frame.resized(RESIZE, RESIZE);
        let offset = (RESIZE - CROP) / 2;
        let cropped = imageops::crop_imm(&resized, offset, offset, CROP, CROP).to_image();
        let input = nchw_input(&cropped, |channel, value| {
            (value as f32 / 255.0 - MEAN[channel]) / STD[channel]
        });
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("scene inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("scene model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("scene output tensor was not f32")?;
        Ok(view.iter().copied().collect())
    }
}
