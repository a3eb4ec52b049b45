//! pomocnik - perception-fusion kernel for spoken scene assistance
//!
//! This crate turns a stream of camera frames into short spoken descriptions of
//! nearby objects, how close they are, and any text printed on them.
//!
//! # Architecture
//!
//! Data flows strictly downstream, one frame at a time:
//!
//! 1. **Ingest** (`ingest`, `worker`): frame sources hand frames to a single
//!    worker thread. A frame offered while the worker is busy is dropped.
//! 2. **Detect** (`detect`): a detector backend produces a raw `[1, 4 + C, N]`
//!    tensor which is decoded, thresholded and de-duplicated (NMS).
//! 3. **Depth** (`depth`): a depth backend produces an inverse-depth map which is
//!    sampled at each box center and quantized into a 1..=11 closeness scale.
//! 4. **Aggregate** (`aggregate`): boxes, distances and recognized text are
//!    joined into a `FrameResult`. Per-box failures degrade, never abort.
//! 5. **Feedback** (`feedback`, `speech`): a rate-limited scheduler merges the
//!    first few results into one utterance for the speech channel.
//!
//! Read mode and scene mode skip detection and depth: they run OCR or a scene
//! classifier (`scene`) on the whole frame and speak the result under the
//! same gate.
//!
//! # Module Structure
//!
//! - `frame`: normalized RGB raster (`RgbFrame`)
//! - `ingest`: frame sources and camera-buffer normalization
//! - `detect`, `depth`, `ocr`, `scene`: model boundaries and their pure post-processing
//! - `aggregate`: per-frame fusion
//! - `feedback`, `speech`: utterance scheduling and speech channels
//! - `pipeline`, `worker`: per-frame orchestration and the serialized worker
//! - `config`: file + environment configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod aggregate;
pub mod config;
pub mod depth;
pub mod detect;
pub mod feedback;
pub mod frame;
pub mod ingest;
pub mod ocr;
pub mod pipeline;
pub mod scene;
pub mod speech;
pub mod worker;

pub use aggregate::{Aggregator, FrameResult, PerceptionResult, StepOutcome};
pub use config::PipelineConfig;
pub use depth::{DepthEstimator, DepthTensor, Distance, DistanceScale, Proximity, ScaleTable};
pub use detect::{decode, suppress, BoundingBox, Detector, LabelSet, RawDetectionTensor};
pub use feedback::{FeedbackMode, FeedbackScheduler, ManualClock, MonotonicClock, OfferOutcome};
pub use frame::RgbFrame;
pub use ingest::{CameraFrame, FrameInput, FrameSource, PixelFormat};
pub use ocr::{OcrPolicy, TextRecognizer, TimedRecognizer};
pub use pipeline::{FrameError, Pipeline};
pub use scene::{SceneClassifier, SceneGuess, SceneTrigger};
pub use speech::{CommandSpeech, LogSpeech, Phrasebook, RecordingSpeech, SpeechSink};
pub use worker::{FrameWorker, Submission, WorkerStatsSnapshot};

// -------------------- Language --------------------

/// Active language. Selects the label set, the phrasebook and the speech voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Sl,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Sl => "sl",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "sl" | "slovenian" | "slovenscina" => Ok(Language::Sl),
            other => Err(anyhow!("unsupported language '{}' (expected en or sl)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_codes_and_names() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" SL ".parse::<Language>().unwrap(), Language::Sl);
        assert_eq!("english".parse::<Language>().unwrap(), Language::En);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn language_round_trips_through_serde() {
        let json = serde_json::to_string(&Language::Sl).unwrap();
        assert_eq!(json, "\"sl\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::Sl);
    }
}
