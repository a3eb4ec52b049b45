use std::sync::Arc;

use anyhow::{anyhow, Result};

use pomocnik::depth::ScriptedDepth;
use pomocnik::detect::{DetectionTensorBuilder, DetectorBackend, ScriptedDetector};
use pomocnik::{
    Aggregator, DepthEstimator, DepthTensor, Detector, Distance, FeedbackMode, FeedbackScheduler,
    LabelSet, ManualClock, Pipeline, RawDetectionTensor, RecordingSpeech, RgbFrame, ScaleTable,
    TextRecognizer,
};

fn frame() -> RgbFrame {
    RgbFrame::from_rgb(vec![60u8; 64 * 64 * 3], 64, 64).unwrap()
}

fn scheduler(speech: &RecordingSpeech) -> Arc<FeedbackScheduler> {
    Arc::new(
        FeedbackScheduler::new(Box::new(speech.clone()), FeedbackMode::Assist)
            .with_clock(Arc::new(ManualClock::new())),
    )
}

fn person_tensor() -> RawDetectionTensor {
    DetectionTensorBuilder::new(1, 1)
        .anchor(0, [0.5, 0.5, 0.2, 0.4], &[0.81])
        .build()
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn person_at_close_range_is_announced() {
    let speech = RecordingSpeech::new();
    let detector = Detector::new(
        ScriptedDetector::fixed(person_tensor()),
        LabelSet::new(vec!["person".into()]),
    );
    let depth = DepthEstimator::new(ScriptedDepth::fixed(
        DepthTensor::filled(256, 256, 950.0).unwrap(),
    ));
    let table = ScaleTable::new(vec![
        900.0, 800.0, 700.0, 600.0, 500.0, 400.0, 300.0, 200.0, 100.0, 50.0,
    ])
    .unwrap();
    let mut pipeline = Pipeline::assist(
        detector,
        Some(depth),
        Aggregator::new(table),
        scheduler(&speech),
    );

    let result = pipeline.process(&frame()).unwrap();
    assert_eq!(result.results.len(), 1);
    let person = &result.results[0];
    let bbox = &person.bounding_box;
    assert!(approx(bbox.x1, 0.4) && approx(bbox.y1, 0.3));
    assert!(approx(bbox.x2, 0.6) && approx(bbox.y2, 0.7));
    assert!(approx(bbox.confidence, 0.81));
    assert_eq!(person.distance.scale().map(|s| s.get()), Some(1));
    assert_eq!(person.recognized_text, None);
    assert_eq!(speech.spoken(), vec!["person, very close".to_string()]);
}

#[test]
fn default_table_keeps_the_same_phrase() {
    let table = ScaleTable::default();
    let scale = table.to_scale(950.0);
    assert_eq!(scale.get(), 2);
    assert_eq!(
        Distance::Scale(scale).proximity(),
        Distance::Scale(ScaleTable::new(vec![900.0, 50.0]).unwrap().to_scale(950.0)).proximity()
    );
}

/// Fails on every other crop.
struct FlakyOcr {
    calls: usize,
}

impl TextRecognizer for FlakyOcr {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn recognize(&mut self, _crop: &RgbFrame) -> Result<Option<String>> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(anyhow!("engine hiccup"));
        }
        Ok(Some(format!("label {}", self.calls)))
    }
}

#[test]
fn partial_ocr_failure_keeps_every_box() {
    let speech = RecordingSpeech::new();
    let tensor = DetectionTensorBuilder::new(1, 3)
        .anchor(0, [0.2, 0.5, 0.2, 0.3], &[0.9])
        .anchor(1, [0.5, 0.5, 0.2, 0.3], &[0.8])
        .anchor(2, [0.8, 0.5, 0.2, 0.3], &[0.7])
        .build();
    let detector = Detector::new(
        ScriptedDetector::fixed(tensor),
        LabelSet::new(vec!["sign".into()]),
    );
    let aggregator =
        Aggregator::new(ScaleTable::default()).with_recognizer(FlakyOcr { calls: 0 });
    let mut pipeline = Pipeline::assist(detector, None, aggregator, scheduler(&speech));

    let result = pipeline.process(&frame()).unwrap();
    let texts: Vec<Option<&str>> = result
        .results
        .iter()
        .map(|r| r.recognized_text.as_deref())
        .collect();
    assert_eq!(texts, vec![Some("label 1"), None, Some("label 3")]);
    assert_eq!(result.failed_steps, 1);
    assert_eq!(
        speech.spoken(),
        vec![
            "sign, distance unavailable. Text: label 1. sign, distance unavailable. \
             sign, distance unavailable. Text: label 3"
                .to_string()
        ]
    );
}

#[test]
fn depth_failure_degrades_to_unknown() {
    let speech = RecordingSpeech::new();
    let detector = Detector::new(
        ScriptedDetector::fixed(person_tensor()),
        LabelSet::new(vec!["person".into()]),
    );
    let depth = DepthEstimator::new(ScriptedDepth::failing("delegate crashed"));
    let mut pipeline = Pipeline::assist(
        detector,
        Some(depth),
        Aggregator::new(ScaleTable::default()),
        scheduler(&speech),
    );

    let result = pipeline.process(&frame()).unwrap();
    assert_eq!(result.results[0].distance, Distance::Unknown);
    assert_eq!(speech.spoken(), vec!["person, distance unavailable".to_string()]);
}

struct BrokenDetector;

impl DetectorBackend for BrokenDetector {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn infer(&mut self, _frame: &RgbFrame) -> Result<RawDetectionTensor> {
        Err(anyhow!("interpreter not initialized"))
    }
}

#[test]
fn detection_failure_aborts_the_frame() {
    let speech = RecordingSpeech::new();
    let detector = Detector::new(BrokenDetector, LabelSet::default());
    let mut pipeline = Pipeline::assist(
        detector,
        None,
        Aggregator::new(ScaleTable::default()),
        scheduler(&speech),
    );

    let err = pipeline.process(&frame()).unwrap_err();
    assert_eq!(err.code(), "detection");
    assert!(err.to_string().contains("interpreter not initialized"));
    assert!(speech.spoken().is_empty());
}

#[test]
fn nothing_detected_is_silent() {
    let speech = RecordingSpeech::new();
    let detector = Detector::new(
        ScriptedDetector::fixed(RawDetectionTensor::empty(1)),
        LabelSet::default(),
    );
    let mut pipeline = Pipeline::assist(
        detector,
        None,
        Aggregator::new(ScaleTable::default()),
        scheduler(&speech),
    );
    let result = pipeline.process(&frame()).unwrap();
    assert!(result.is_empty());
    assert!(speech.spoken().is_empty());
}
