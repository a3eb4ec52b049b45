//! Per-frame orchestration.
//!
//! `Pipeline::process` runs one frame synchronously: detect, estimate depth,
//! aggregate (sampling + OCR), then offer the result to the feedback
//! scheduler. Read and scene modes replace the object path with whole-frame
//! OCR or scene classification. Only conversion and detection failures abort
//! a frame.

use std::path::PathBuf;
use std::sync::Arc;

use crate::aggregate::{Aggregator, FrameResult, StepOutcome};
use crate::depth::{DepthEstimator, DepthTensor, Distance, ScaleTable};
use crate::detect::Detector;
use crate::feedback::{FeedbackMode, FeedbackScheduler};
use crate::frame::RgbFrame;
use crate::ingest::FrameInput;
use crate::scene::{SceneClassifier, SceneGuess, SceneTrigger, ANNOUNCE_CONFIDENCE, READ_CONFIDENCE};

/// A failure that aborts processing of one frame.
#[derive(Debug)]
pub enum FrameError {
    /// The camera buffer could not be turned into an RGB frame.
    Conversion(anyhow::Error),
    /// Detector inference failed.
    Detection(anyhow::Error),
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::Conversion(_) => "conversion",
            FrameError::Detection(_) => "detection",
        }
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Conversion(err) | FrameError::Detection(err) => {
                write!(f, "{}: {:#}", self.code(), err)
            }
        }
    }
}
impl std::error::Error for FrameError {}

pub struct Pipeline {
    mode: FeedbackMode,
    detector: Option<Detector>,
    depth: Option<DepthEstimator>,
    scene: Option<SceneClassifier>,
    scene_trigger: SceneTrigger,
    aggregator: Aggregator,
    scheduler: Arc<FeedbackScheduler>,
    depth_dump: Option<PathBuf>,
}

impl Pipeline {
    /// Objects, distances and text. Without a depth estimator every distance
    /// is unknown.
    pub fn assist(
        detector: Detector,
        depth: Option<DepthEstimator>,
        aggregator: Aggregator,
        scheduler: Arc<FeedbackScheduler>,
    ) -> Self {
        Self {
            mode: FeedbackMode::Assist,
            detector: Some(detector),
            depth,
            scene: None,
            scene_trigger: SceneTrigger::new(),
            aggregator,
            scheduler,
            depth_dump: None,
        }
    }

    /// Center-of-view distance only.
    pub fn depth_only(
        depth: DepthEstimator,
        aggregator: Aggregator,
        scheduler: Arc<FeedbackScheduler>,
    ) -> Self {
        Self {
            mode: FeedbackMode::DepthOnly,
            detector: None,
            depth: Some(depth),
            scene: None,
            scene_trigger: SceneTrigger::new(),
            aggregator,
            scheduler,
            depth_dump: None,
        }
    }

    /// Whole-frame text through the aggregator's recognizer.
    pub fn read(aggregator: Aggregator, scheduler: Arc<FeedbackScheduler>) -> Self {
        Self {
            mode: FeedbackMode::Read,
            detector: None,
            depth: None,
            scene: None,
            scene_trigger: SceneTrigger::new(),
            aggregator,
            scheduler,
            depth_dump: None,
        }
    }

    /// Name the current place whenever the classifier is confident enough.
    pub fn scene(classifier: SceneClassifier, scheduler: Arc<FeedbackScheduler>) -> Self {
        Self {
            mode: FeedbackMode::Scene,
            detector: None,
            depth: None,
            scene: Some(classifier),
            scene_trigger: SceneTrigger::new(),
            aggregator: Aggregator::new(ScaleTable::default()),
            scheduler,
            depth_dump: None,
        }
    }

    /// Announce the scene once on the first assist frame, and again after
    /// every `SceneTrigger::rearm`.
    pub fn with_scene(mut self, classifier: SceneClassifier) -> Self {
        self.scene = Some(classifier);
        self
    }

    /// Handle for re-arming the assist scene announcement from another thread.
    pub fn scene_trigger(&self) -> SceneTrigger {
        self.scene_trigger.clone()
    }

    /// Write each depth map as a grayscale image to `path` (overwritten per frame).
    pub fn with_depth_dump(mut self, path: PathBuf) -> Self {
        self.depth_dump = Some(path);
        self
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    pub fn scheduler(&self) -> &Arc<FeedbackScheduler> {
        &self.scheduler
    }

    /// Convert, stamp and process a frame handed over by the worker.
    pub fn handle(&mut self, sequence: u64, input: FrameInput) -> Result<FrameResult, FrameError> {
        let frame = input
            .into_rgb()
            .map_err(FrameError::Conversion)?
            .with_sequence(sequence);
        self.process(&frame)
    }

    pub fn process(&mut self, frame: &RgbFrame) -> Result<FrameResult, FrameError> {
        match self.mode {
            FeedbackMode::Assist => self.process_assist(frame),
            FeedbackMode::DepthOnly => Ok(self.process_depth_only(frame)),
            FeedbackMode::Read => Ok(self.process_read(frame)),
            FeedbackMode::Scene => Ok(self.process_scene(frame)),
        }
    }

    fn process_assist(&mut self, frame: &RgbFrame) -> Result<FrameResult, FrameError> {
        let scene = self.announce_scene_once(frame);
        let detector = self.detector.as_mut().ok_or_else(|| {
            FrameError::Detection(anyhow::anyhow!("assist pipeline has no detector"))
        })?;
        let boxes = detector.detect(frame).map_err(FrameError::Detection)?;

        let depth = if boxes.is_empty() {
            None
        } else {
            self.estimate_depth(frame)
        };
        let mut result = self.aggregator.aggregate(frame, boxes, depth.as_ref());
        result.scene = scene;

        let outcome = self.scheduler.offer(&result);
        log::debug!(
            "frame {}: {} results, offer {:?}",
            result.sequence,
            result.results.len(),
            outcome
        );
        Ok(result)
    }

    fn process_depth_only(&mut self, frame: &RgbFrame) -> FrameResult {
        let mut result = FrameResult {
            sequence: frame.sequence(),
            ..FrameResult::default()
        };
        match self.estimate_depth(frame) {
            Some(depth) => {
                let distance = self.aggregator.distance_of(depth.center_value());
                let outcome = self.scheduler.offer_center(distance);
                log::debug!(
                    "frame {}: center {:?}, offer {:?}",
                    frame.sequence(),
                    distance,
                    outcome
                );
                result.center = Some(distance);
            }
            None => {
                result.center = Some(Distance::Unknown);
                result.failed_steps = 1;
            }
        }
        result
    }

    fn process_read(&mut self, frame: &RgbFrame) -> FrameResult {
        let mut result = FrameResult {
            sequence: frame.sequence(),
            ..FrameResult::default()
        };
        match self.aggregator.read_frame(frame) {
            StepOutcome::Success(Some(text)) => {
                let outcome = self.scheduler.offer_text(&text);
                log::debug!("frame {}: read {:?}, offer {:?}", frame.sequence(), text, outcome);
                result.text = Some(text);
            }
            StepOutcome::Success(None) | StepOutcome::Degraded(_) => {}
            StepOutcome::Failed(reason) => {
                log::warn!("frame {}: text recognition failed: {}", frame.sequence(), reason);
                result.failed_steps = 1;
            }
        }
        result
    }

    fn process_scene(&mut self, frame: &RgbFrame) -> FrameResult {
        let mut result = FrameResult {
            sequence: frame.sequence(),
            ..FrameResult::default()
        };
        let Some(classifier) = self.scene.as_mut() else {
            result.failed_steps = 1;
            return result;
        };
        match classifier.classify(frame) {
            Ok(Some(guess)) => {
                if guess.confidence > READ_CONFIDENCE {
                    let outcome = self.scheduler.offer_text(&guess.label);
                    log::debug!("frame {}: scene {:?}, offer {:?}", frame.sequence(), guess, outcome);
                }
                result.scene = Some(guess);
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("frame {}: scene unavailable: {:#}", frame.sequence(), err);
                result.failed_steps = 1;
            }
        }
        result
    }

    /// The trigger is consumed whether or not the announcement is spoken.
    fn announce_scene_once(&mut self, frame: &RgbFrame) -> Option<SceneGuess> {
        let classifier = self.scene.as_mut()?;
        if !self.scene_trigger.take() {
            return None;
        }
        match classifier.classify(frame) {
            Ok(Some(guess)) => {
                if guess.confidence > ANNOUNCE_CONFIDENCE {
                    let outcome = self.scheduler.announce_scene(&guess.label);
                    log::info!(
                        "frame {}: scene '{}' ({:.2}), announce {:?}",
                        frame.sequence(),
                        guess.label,
                        guess.confidence,
                        outcome
                    );
                }
                Some(guess)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("frame {}: scene announcement skipped: {:#}", frame.sequence(), err);
                None
            }
        }
    }

    /// Depth failures degrade the frame instead of aborting it.
    fn estimate_depth(&mut self, frame: &RgbFrame) -> Option<DepthTensor> {
        let estimator = self.depth.as_mut()?;
        match estimator.estimate(frame) {
            Ok(depth) => {
                if let Some(path) = &self.depth_dump {
                    if let Err(err) = depth.to_grayscale().save(path) {
                        log::warn!("failed to write depth map to {}: {}", path.display(), err);
                    }
                }
                Some(depth)
            }
            Err(err) => {
                log::warn!(
                    "frame {}: depth unavailable, distances unknown: {:#}",
                    frame.sequence(),
                    err
                );
                None
            }
        }
    }

    /// Silence speech for good and release the models. Idempotent.
    pub fn shutdown(&mut self) {
        self.scheduler.halt();
        if let Some(detector) = self.detector.as_mut() {
            detector.close();
        }
        if let Some(depth) = self.depth.as_mut() {
            depth.close();
        }
        if let Some(scene) = self.scene.as_mut() {
            scene.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::{ScaleTable, ScriptedDepth};
    use crate::detect::{DetectionTensorBuilder, LabelSet, RawDetectionTensor, ScriptedDetector};
    use crate::feedback::ManualClock;
    use crate::ingest::{CameraFrame, PixelFormat};
    use crate::ocr::TextRecognizer;
    use crate::scene::ScriptedScene;
    use crate::speech::RecordingSpeech;
    use anyhow::anyhow;
    use std::time::Duration;

    /// Reads scripted answers in order; `None` entries fail.
    struct ScriptedOcr(Vec<Option<&'static str>>);

    impl TextRecognizer for ScriptedOcr {
        fn name(&self) -> &'static str {
            "scripted-ocr"
        }

        fn recognize(&mut self, _image: &RgbFrame) -> anyhow::Result<Option<String>> {
            match self.0.remove(0) {
                Some(text) => Ok(Some(text.to_string())),
                None => Err(anyhow!("engine offline")),
            }
        }
    }

    fn rooms() -> LabelSet {
        LabelSet::parse_categories("kitchen\nliving_room\n")
    }

    fn scheduler(speech: &RecordingSpeech, mode: FeedbackMode) -> Arc<FeedbackScheduler> {
        timed_scheduler(speech, mode, &ManualClock::new())
    }

    fn timed_scheduler(
        speech: &RecordingSpeech,
        mode: FeedbackMode,
        clock: &ManualClock,
    ) -> Arc<FeedbackScheduler> {
        Arc::new(
            FeedbackScheduler::new(Box::new(speech.clone()), mode)
                .with_clock(Arc::new(clock.clone())),
        )
    }

    fn person() -> RawDetectionTensor {
        DetectionTensorBuilder::new(1, 1)
            .anchor(0, [0.5, 0.5, 0.2, 0.4], &[0.81])
            .build()
    }

    fn frame() -> RgbFrame {
        RgbFrame::from_rgb(vec![0u8; 8 * 8 * 3], 8, 8).unwrap()
    }

    #[test]
    fn bad_camera_buffer_is_a_conversion_error() {
        let speech = RecordingSpeech::new();
        let detector = Detector::new(ScriptedDetector::fixed(person()), LabelSet::default());
        let mut pipeline = Pipeline::assist(
            detector,
            None,
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::Assist),
        );
        let broken = CameraFrame::packed(4, 4, PixelFormat::Nv21, vec![0u8; 5]);
        let err = pipeline.handle(1, broken.into()).unwrap_err();
        assert_eq!(err.code(), "conversion");
        assert!(speech.spoken().is_empty());
    }

    #[test]
    fn no_depth_estimator_means_unknown_distance() {
        let speech = RecordingSpeech::new();
        let labels = LabelSet::new(vec!["person".into()]);
        let detector = Detector::new(ScriptedDetector::fixed(person()), labels);
        let mut pipeline = Pipeline::assist(
            detector,
            None,
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::Assist),
        );
        let result = pipeline.handle(4, frame().into()).unwrap();
        assert_eq!(result.sequence, 4);
        assert_eq!(result.results[0].distance, Distance::Unknown);
        assert_eq!(speech.spoken(), vec!["person, distance unavailable".to_string()]);
    }

    #[test]
    fn depth_only_speaks_center_reading() {
        let speech = RecordingSpeech::new();
        let depth = DepthEstimator::new(ScriptedDepth::fixed(DepthTensor::filled(4, 4, 350.0).unwrap()));
        let mut pipeline = Pipeline::depth_only(
            depth,
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::DepthOnly),
        );
        let result = pipeline.process(&frame()).unwrap();
        // 350 lies in (300, 400]: scale 8.
        assert_eq!(result.center.and_then(Distance::scale).map(|s| s.get()), Some(8));
        assert_eq!(speech.spoken(), vec!["far, scale 8".to_string()]);
    }

    #[test]
    fn depth_only_failure_is_unknown_and_silent() {
        let speech = RecordingSpeech::new();
        let depth = DepthEstimator::new(ScriptedDepth::failing("model missing"));
        let mut pipeline = Pipeline::depth_only(
            depth,
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::DepthOnly),
        );
        let result = pipeline.process(&frame()).unwrap();
        assert_eq!(result.center, Some(Distance::Unknown));
        assert_eq!(result.failed_steps, 1);
        assert!(speech.spoken().is_empty());
    }

    #[test]
    fn shutdown_releases_models_and_halts_speech() {
        let speech = RecordingSpeech::new();
        let detector = Detector::new(ScriptedDetector::fixed(person()), LabelSet::default());
        let depth = DepthEstimator::new(ScriptedDepth::fixed(DepthTensor::filled(2, 2, 1.0).unwrap()));
        let mut pipeline = Pipeline::assist(
            detector,
            Some(depth),
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::Assist),
        );
        pipeline.shutdown();
        pipeline.shutdown();
        assert!(pipeline.scheduler().is_halted());
        assert_eq!(pipeline.process(&frame()).unwrap_err().code(), "detection");
    }

    #[test]
    fn read_mode_speaks_text_and_skips_blank_or_failed_reads() {
        let speech = RecordingSpeech::new();
        let clock = ManualClock::new();
        let ocr = ScriptedOcr(vec![Some("  \n "), None, Some("PUSH\nDOOR")]);
        let mut pipeline = Pipeline::read(
            Aggregator::new(ScaleTable::default()).with_recognizer(ocr),
            timed_scheduler(&speech, FeedbackMode::Read, &clock),
        );

        let blank = pipeline.process(&frame()).unwrap();
        assert_eq!(blank.text, None);
        assert_eq!(blank.failed_steps, 0);

        let failed = pipeline.process(&frame()).unwrap();
        assert_eq!(failed.text, None);
        assert_eq!(failed.failed_steps, 1);

        let read = pipeline.process(&frame()).unwrap();
        assert_eq!(read.text.as_deref(), Some("PUSH DOOR"));
        assert_eq!(speech.spoken(), vec!["PUSH DOOR".to_string()]);
        assert!(pipeline.scheduler().last_spoken_at().is_some());
    }

    #[test]
    fn scene_mode_needs_confidence_above_read_threshold() {
        let speech = RecordingSpeech::new();
        let clock = ManualClock::new();
        // [0, ln 1.5] gives 0.6 for living room; four equal logits give 0.25.
        let logits = vec![
            vec![0.0, 1.5f32.ln()],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.5f32.ln()],
        ];
        let mut pipeline = Pipeline::scene(
            SceneClassifier::new(ScriptedScene::new(logits), rooms()),
            timed_scheduler(&speech, FeedbackMode::Scene, &clock),
        );

        let first = pipeline.process(&frame()).unwrap();
        assert_eq!(first.scene.as_ref().map(|g| g.label.as_str()), Some("living room"));

        clock.advance(Duration::from_secs(2));
        let unsure = pipeline.process(&frame()).unwrap();
        assert_eq!(unsure.scene.as_ref().map(|g| g.confidence), Some(0.25));

        // The unsure frame left the gate open.
        let again = pipeline.process(&frame()).unwrap();
        assert!(again.scene.is_some());
        assert_eq!(
            speech.spoken(),
            vec!["living room".to_string(), "living room".to_string()]
        );
    }

    #[test]
    fn scene_mode_failure_is_silent() {
        let speech = RecordingSpeech::new();
        let mut pipeline = Pipeline::scene(
            SceneClassifier::new(ScriptedScene::failing("model missing"), rooms()),
            scheduler(&speech, FeedbackMode::Scene),
        );
        let result = pipeline.process(&frame()).unwrap();
        assert_eq!(result.scene, None);
        assert_eq!(result.failed_steps, 1);
        assert!(speech.spoken().is_empty());
    }

    #[test]
    fn assist_announces_scene_once_until_rearmed() {
        let speech = RecordingSpeech::new();
        let clock = ManualClock::new();
        let detector = Detector::new(
            ScriptedDetector::fixed(DetectionTensorBuilder::new(1, 1).build()),
            LabelSet::default(),
        );
        // 0.25 per class with four classes: above the announcement threshold.
        let scene = SceneClassifier::new(ScriptedScene::fixed(vec![0.0; 4]), rooms());
        let mut pipeline = Pipeline::assist(
            detector,
            None,
            Aggregator::new(ScaleTable::default()),
            timed_scheduler(&speech, FeedbackMode::Assist, &clock),
        )
        .with_scene(scene);
        let trigger = pipeline.scene_trigger();

        let first = pipeline.process(&frame()).unwrap();
        assert_eq!(first.scene.map(|g| g.label), Some("kitchen".to_string()));
        assert!(pipeline.process(&frame()).unwrap().scene.is_none());
        assert_eq!(speech.spoken(), vec!["You are in kitchen".to_string()]);

        trigger.rearm();
        clock.advance(Duration::from_secs(1));
        assert!(pipeline.process(&frame()).unwrap().scene.is_some());
        assert_eq!(speech.spoken().len(), 2);
        assert!(!trigger.is_armed());
    }

    #[test]
    fn assist_announcement_needs_confidence_above_threshold() {
        let speech = RecordingSpeech::new();
        let detector = Detector::new(
            ScriptedDetector::fixed(DetectionTensorBuilder::new(1, 1).build()),
            LabelSet::default(),
        );
        // Five even classes: 0.2, not above the threshold.
        let scene = SceneClassifier::new(ScriptedScene::fixed(vec![0.0; 5]), rooms());
        let mut pipeline = Pipeline::assist(
            detector,
            None,
            Aggregator::new(ScaleTable::default()),
            scheduler(&speech, FeedbackMode::Assist),
        )
        .with_scene(scene);

        let result = pipeline.process(&frame()).unwrap();
        assert!(result.scene.is_some());
        assert!(speech.spoken().is_empty());
        assert!(!pipeline.scene_trigger().is_armed());
    }
}
