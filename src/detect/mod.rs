//! Object detection: backend boundary plus pure post-processing.
//!
//! Backends return raw `[1, 4 + C, N]` tensors. `decode` turns anchors into
//! normalized boxes and `suppress` removes duplicates (greedy NMS).

mod backend;
pub mod backends;
mod decode;
mod labels;
mod result;
mod tensor;

use anyhow::{anyhow, Context, Result};

use crate::frame::RgbFrame;

pub use backend::DetectorBackend;
pub use backends::ScriptedDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use decode::{decode, suppress};
pub use labels::LabelSet;
pub use result::BoundingBox;
pub use tensor::{DetectionTensorBuilder, RawDetectionTensor, BOX_ROWS};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// A loaded detector: backend, class labels and post-processing thresholds.
pub struct Detector {
    backend: Option<Box<dyn DetectorBackend>>,
    labels: LabelSet,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B, labels: LabelSet) -> Self {
        log::info!(
            "detector backend '{}' ready with {} labels",
            backend.name(),
            labels.len()
        );
        Self {
            backend: Some(Box::new(backend)),
            labels,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, confidence_threshold: f32, iou_threshold: f32) -> Self {
        self.confidence_threshold = confidence_threshold;
        self.iou_threshold = iou_threshold;
        self
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    /// Replace the class labels, e.g. after a language switch.
    pub fn set_labels(&mut self, labels: LabelSet) {
        self.labels = labels;
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend_mut()?.warm_up()
    }

    /// Detect objects in a frame: infer, decode, then suppress duplicates.
    pub fn detect(&mut self, frame: &RgbFrame) -> Result<Vec<BoundingBox>> {
        let raw = self
            .backend_mut()?
            .infer(frame)
            .context("detector inference failed")?;
        let candidates = decode(&raw, self.confidence_threshold, &self.labels);
        let candidate_count = candidates.len();
        let boxes = suppress(candidates, self.iou_threshold);
        log::debug!(
            "frame {}: {} anchors, {} candidates, {} after suppression",
            frame.sequence(),
            raw.num_anchors(),
            candidate_count,
            boxes.len()
        );
        Ok(boxes)
    }

    /// Release the backend. Later `detect` calls fail.
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            log::info!("detector backend '{}' released", backend.name());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn DetectorBackend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| anyhow!("detector has been closed"))
    }
}
