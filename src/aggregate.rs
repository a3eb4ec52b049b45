//! Per-frame fusion of detections, depth and recognized text.
//!
//! Each box goes through two independent steps (depth sampling and OCR). A
//! failing step degrades that box only; siblings and the frame carry on.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

use crate::depth::{DepthTensor, Distance, ScaleTable};
use crate::detect::BoundingBox;
use crate::frame::RgbFrame;
use crate::ocr::{normalize_text, NoText, OcrPolicy, TextRecognizer};
use crate::scene::SceneGuess;

/// Outcome of one per-box step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome<T> {
    Success(T),
    /// The step had nothing to work with (no depth map, empty crop).
    Degraded(&'static str),
    Failed(String),
}

impl<T> StepOutcome<T> {
    pub fn success(self) -> Option<T> {
        match self {
            StepOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerceptionResult {
    pub bounding_box: BoundingBox,
    pub distance: Distance,
    pub recognized_text: Option<String>,
}

/// Everything the pipeline learned about one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameResult {
    pub sequence: u64,
    /// In detector output order (confidence descending after suppression).
    pub results: Vec<PerceptionResult>,
    /// Center-of-view distance, set in depth-only mode.
    pub center: Option<Distance>,
    /// Whole-frame text, set in read mode.
    pub text: Option<String>,
    /// Whole-frame scene, set in scene mode and on the assist announcement.
    pub scene: Option<SceneGuess>,
    /// Number of steps that failed outright.
    pub failed_steps: usize,
}

impl FrameResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.center.is_none() && self.text.is_none() && self.scene.is_none()
    }
}

pub struct Aggregator {
    scale_table: ScaleTable,
    ocr_policy: OcrPolicy,
    recognizer: Box<dyn TextRecognizer>,
}

impl Aggregator {
    pub fn new(scale_table: ScaleTable) -> Self {
        Self {
            scale_table,
            ocr_policy: OcrPolicy::default(),
            recognizer: Box::new(NoText),
        }
    }

    pub fn with_recognizer<R: TextRecognizer + 'static>(mut self, recognizer: R) -> Self {
        self.recognizer = Box::new(recognizer);
        self
    }

    pub fn with_policy(mut self, policy: OcrPolicy) -> Self {
        self.ocr_policy = policy;
        self
    }

    pub fn scale_table(&self) -> &ScaleTable {
        &self.scale_table
    }

    pub fn ocr_policy(&self) -> &OcrPolicy {
        &self.ocr_policy
    }

    /// Distance for a raw inverse-depth reading.
    pub fn distance_of(&self, raw: f32) -> Distance {
        Distance::Scale(self.scale_table.to_scale(raw))
    }

    /// Fuse one frame's boxes with its depth map (if any) and OCR.
    pub fn aggregate(
        &mut self,
        frame: &RgbFrame,
        boxes: Vec<BoundingBox>,
        depth: Option<&DepthTensor>,
    ) -> FrameResult {
        let mut failed_steps = 0usize;
        let mut results = Vec::with_capacity(boxes.len());

        for bounding_box in boxes {
            let distance = match self.sample_distance(&bounding_box, depth) {
                StepOutcome::Success(distance) => distance,
                StepOutcome::Degraded(_) => Distance::Unknown,
                StepOutcome::Failed(reason) => {
                    log::warn!(
                        "frame {}: depth sample for '{}' failed: {}",
                        frame.sequence(),
                        bounding_box.class_name,
                        reason
                    );
                    failed_steps += 1;
                    Distance::Unknown
                }
            };

            let recognized_text = match self.read_text(frame, &bounding_box) {
                StepOutcome::Success(text) => text,
                StepOutcome::Degraded(reason) => {
                    log::trace!(
                        "frame {}: OCR skipped for '{}': {}",
                        frame.sequence(),
                        bounding_box.class_name,
                        reason
                    );
                    None
                }
                StepOutcome::Failed(reason) => {
                    log::warn!(
                        "frame {}: OCR for '{}' failed: {}",
                        frame.sequence(),
                        bounding_box.class_name,
                        reason
                    );
                    failed_steps += 1;
                    None
                }
            };

            results.push(PerceptionResult {
                bounding_box,
                distance,
                recognized_text,
            });
        }

        FrameResult {
            sequence: frame.sequence(),
            results,
            failed_steps,
            ..FrameResult::default()
        }
    }

    /// OCR over the whole frame, regardless of the class policy.
    pub fn read_frame(&mut self, frame: &RgbFrame) -> StepOutcome<Option<String>> {
        recognize_contained(self.recognizer.as_mut(), frame)
    }

    fn sample_distance(
        &self,
        bounding_box: &BoundingBox,
        depth: Option<&DepthTensor>,
    ) -> StepOutcome<Distance> {
        let Some(depth) = depth else {
            return StepOutcome::Degraded("no depth map");
        };
        match depth.sample(bounding_box.cx, bounding_box.cy) {
            Ok(raw) => StepOutcome::Success(self.distance_of(raw)),
            Err(err) => StepOutcome::Failed(err.to_string()),
        }
    }

    fn read_text(&mut self, frame: &RgbFrame, bounding_box: &BoundingBox) -> StepOutcome<Option<String>> {
        if !self.ocr_policy.admits(bounding_box) {
            return StepOutcome::Degraded("class not admitted by OCR policy");
        }
        let Some(crop) = frame.crop(bounding_box) else {
            return StepOutcome::Degraded("empty crop");
        };

        recognize_contained(self.recognizer.as_mut(), &crop)
    }
}

fn recognize_contained(
    recognizer: &mut dyn TextRecognizer,
    image: &RgbFrame,
) -> StepOutcome<Option<String>> {
    match panic::catch_unwind(AssertUnwindSafe(|| recognizer.recognize(image))) {
        Ok(Ok(text)) => StepOutcome::Success(text.as_deref().and_then(normalize_text)),
        Ok(Err(err)) => StepOutcome::Failed(format!("{:#}", err)),
        Err(_) => StepOutcome::Failed("recognizer panicked".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    /// Fails on crops narrower than `min_width`, reads "EXIT" otherwise.
    struct PickyOcr {
        min_width: u32,
    }

    impl TextRecognizer for PickyOcr {
        fn name(&self) -> &'static str {
            "picky"
        }

        fn recognize(&mut self, crop: &RgbFrame) -> Result<Option<String>> {
            if crop.width() < self.min_width {
                return Err(anyhow!("crop too narrow"));
            }
            Ok(Some("EXIT\n".to_string()))
        }
    }

    struct Panicky;

    impl TextRecognizer for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn recognize(&mut self, _crop: &RgbFrame) -> Result<Option<String>> {
            panic!("engine crashed");
        }
    }

    fn frame() -> RgbFrame {
        RgbFrame::from_rgb(vec![90u8; 100 * 100 * 3], 100, 100)
            .unwrap()
            .with_sequence(3)
    }

    fn bbox(cx: f32, w: f32, class_name: &str) -> BoundingBox {
        BoundingBox::from_center(cx, 0.5, w, 0.4, 0.8, 0, class_name.to_string())
    }

    #[test]
    fn missing_depth_marks_every_box_unknown() {
        let mut aggregator = Aggregator::new(ScaleTable::default());
        let result = aggregator.aggregate(&frame(), vec![bbox(0.3, 0.2, "a"), bbox(0.7, 0.2, "b")], None);
        assert_eq!(result.sequence, 3);
        assert!(result
            .results
            .iter()
            .all(|r| r.distance == Distance::Unknown));
        assert_eq!(result.failed_steps, 0);
    }

    #[test]
    fn depth_is_sampled_at_box_center() {
        let rows = vec![vec![950.0, 150.0]];
        let depth = DepthTensor::from_rows(rows).unwrap();
        let mut aggregator = Aggregator::new(ScaleTable::default());
        let result = aggregator.aggregate(
            &frame(),
            vec![bbox(0.2, 0.2, "near"), bbox(0.8, 0.2, "far")],
            Some(&depth),
        );
        assert_eq!(result.results[0].distance.scale().unwrap().get(), 2);
        assert_eq!(result.results[1].distance.scale().unwrap().get(), 10);
    }

    #[test]
    fn ocr_failure_is_contained_to_its_box() {
        let mut aggregator =
            Aggregator::new(ScaleTable::default()).with_recognizer(PickyOcr { min_width: 10 });
        let boxes = vec![bbox(0.3, 0.05, "narrow"), bbox(0.7, 0.3, "sign")];
        let result = aggregator.aggregate(&frame(), boxes, None);

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].recognized_text, None);
        assert_eq!(result.results[1].recognized_text.as_deref(), Some("EXIT"));
        assert_eq!(result.failed_steps, 1);
    }

    #[test]
    fn recognizer_panic_degrades_box() {
        let mut aggregator = Aggregator::new(ScaleTable::default()).with_recognizer(Panicky);
        let result = aggregator.aggregate(&frame(), vec![bbox(0.5, 0.2, "sign")], None);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].recognized_text, None);
        assert_eq!(result.failed_steps, 1);
    }

    #[test]
    fn whole_frame_read_ignores_policy_and_contains_panics() {
        let mut aggregator = Aggregator::new(ScaleTable::default())
            .with_recognizer(PickyOcr { min_width: 0 })
            .with_policy(OcrPolicy::Never);
        assert_eq!(
            aggregator.read_frame(&frame()),
            StepOutcome::Success(Some("EXIT".to_string()))
        );

        let mut panicky = Aggregator::new(ScaleTable::default()).with_recognizer(Panicky);
        assert!(panicky.read_frame(&frame()).is_failed());
    }

    #[test]
    fn policy_skips_unlisted_classes() {
        let mut aggregator = Aggregator::new(ScaleTable::default())
            .with_recognizer(PickyOcr { min_width: 0 })
            .with_policy(OcrPolicy::allow_list(["sign"]));
        let result = aggregator.aggregate(
            &frame(),
            vec![bbox(0.3, 0.2, "person"), bbox(0.7, 0.2, "Sign")],
            None,
        );
        assert_eq!(result.results[0].recognized_text, None);
        assert_eq!(result.results[1].recognized_text.as_deref(), Some("EXIT"));
        assert_eq!(result.failed_steps, 0);
    }
}
