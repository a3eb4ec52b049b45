use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::depth::{ScaleTable, DEFAULT_BOUNDARIES};
use crate::detect::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD};
use crate::feedback::{FeedbackMode, DEFAULT_MAX_OBJECTS};
use crate::ingest::SourceConfig;
use crate::ocr::OcrPolicy;
use crate::Language;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 5;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_DEPTH_INPUT: u32 = 256;
const DEFAULT_OCR_POLICY: &str = "always";
const DEFAULT_SPEECH_RATE: f32 = 1.0;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    language: Option<String>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    depth: Option<DepthConfigFile>,
    ocr: Option<OcrConfigFile>,
    feedback: Option<FeedbackConfigFile>,
    speech: Option<SpeechConfigFile>,
    scene: Option<SceneConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    labels_dir: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DepthConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    boundaries: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize, Default)]
struct OcrConfigFile {
    policy: Option<String>,
    classes: Option<Vec<String>>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedbackConfigFile {
    mode: Option<String>,
    min_interval_ms: Option<u64>,
    max_objects: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SceneConfigFile {
    model_path: Option<PathBuf>,
    labels_dir: Option<PathBuf>,
    announce: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    command: Option<String>,
    rate: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub language: Language,
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub depth: DepthSettings,
    pub ocr: OcrSettings,
    pub feedback: FeedbackSettings,
    pub speech: SpeechSettings,
    pub scene: SceneSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub labels_dir: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct DepthSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub boundaries: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub policy: String,
    pub classes: Vec<String>,
    /// Bounded wait per crop; `None` runs OCR inline on the worker.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FeedbackSettings {
    pub mode: FeedbackMode,
    /// Explicit interval; `None` uses the mode's default.
    pub min_interval: Option<Duration>,
    pub max_objects: usize,
}

#[derive(Debug, Clone)]
pub struct SceneSettings {
    pub model_path: Option<PathBuf>,
    /// Directory holding `scene_labels_<lang>.txt`.
    pub labels_dir: Option<PathBuf>,
    /// Announce the scene when assist mode starts.
    pub announce: bool,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// External TTS command line; `None` logs utterances instead.
    pub command: Option<String>,
    pub rate: f32,
}

impl PipelineConfig {
    /// Load from the file named by `POMOCNIK_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POMOCNIK_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Like `load`, but with an explicit config file path.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let language = match file.language.as_deref() {
            Some(language) => language.parse()?,
            None => Language::default(),
        };
        let source = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector.model_path,
            labels_dir: detector.labels_dir,
            input_width: detector.input_width.unwrap_or(DEFAULT_DETECTOR_INPUT),
            input_height: detector.input_height.unwrap_or(DEFAULT_DETECTOR_INPUT),
            confidence_threshold: detector
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        };
        let depth = file.depth.unwrap_or_default();
        let depth = DepthSettings {
            model_path: depth.model_path,
            input_size: depth.input_size.unwrap_or(DEFAULT_DEPTH_INPUT),
            boundaries: depth
                .boundaries
                .unwrap_or_else(|| DEFAULT_BOUNDARIES.to_vec()),
        };
        let ocr = file.ocr.unwrap_or_default();
        let ocr = OcrSettings {
            policy: ocr
                .policy
                .unwrap_or_else(|| DEFAULT_OCR_POLICY.to_string()),
            classes: ocr.classes.unwrap_or_default(),
            timeout: ocr.timeout_ms.map(Duration::from_millis),
        };
        let feedback = file.feedback.unwrap_or_default();
        let feedback = FeedbackSettings {
            mode: match feedback.mode.as_deref() {
                Some(mode) => mode.parse()?,
                None => FeedbackMode::default(),
            },
            min_interval: feedback.min_interval_ms.map(Duration::from_millis),
            max_objects: feedback.max_objects.unwrap_or(DEFAULT_MAX_OBJECTS),
        };
        let speech = file.speech.unwrap_or_default();
        let speech = SpeechSettings {
            command: speech.command.filter(|command| !command.trim().is_empty()),
            rate: speech.rate.unwrap_or(DEFAULT_SPEECH_RATE),
        };
        let scene = file.scene.unwrap_or_default();
        let scene = SceneSettings {
            model_path: scene.model_path,
            labels_dir: scene.labels_dir,
            announce: scene.announce.unwrap_or(true),
        };
        Ok(Self {
            language,
            source,
            detector,
            depth,
            ocr,
            feedback,
            speech,
            scene,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(language) = non_empty_env("POMOCNIK_LANGUAGE") {
            self.language = language.parse()?;
        }
        if let Some(url) = non_empty_env("POMOCNIK_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(confidence) = non_empty_env("POMOCNIK_CONFIDENCE") {
            self.detector.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("POMOCNIK_CONFIDENCE must be a number"))?;
        }
        if let Some(iou) = non_empty_env("POMOCNIK_IOU") {
            self.detector.iou_threshold = iou
                .trim()
                .parse()
                .map_err(|_| anyhow!("POMOCNIK_IOU must be a number"))?;
        }
        if let Some(policy) = non_empty_env("POMOCNIK_OCR_POLICY") {
            self.ocr.policy = policy;
        }
        if let Ok(classes) = std::env::var("POMOCNIK_OCR_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.ocr.classes = parsed;
            }
        }
        if let Some(mode) = non_empty_env("POMOCNIK_MODE") {
            self.feedback.mode = mode.parse()?;
        }
        if let Some(command) = non_empty_env("POMOCNIK_SPEECH_COMMAND") {
            self.speech.command = Some(command);
        }
        if let Some(model_path) = non_empty_env("POMOCNIK_SCENE_MODEL") {
            self.scene.model_path = Some(PathBuf::from(model_path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if self.depth.input_size == 0 {
            return Err(anyhow!("depth input size must be greater than zero"));
        }
        if self.feedback.max_objects == 0 {
            return Err(anyhow!("feedback max_objects must be greater than zero"));
        }
        if !(self.speech.rate.is_finite() && self.speech.rate > 0.0) {
            return Err(anyhow!("speech rate must be positive"));
        }
        self.scale_table()?;
        self.ocr_policy()?;
        self.ocr.classes = self
            .ocr
            .classes
            .iter()
            .map(|class| class.trim().to_lowercase())
            .collect();
        Ok(())
    }

    pub fn scale_table(&self) -> Result<ScaleTable> {
        ScaleTable::new(self.depth.boundaries.clone())
    }

    pub fn ocr_policy(&self) -> Result<OcrPolicy> {
        OcrPolicy::from_config(&self.ocr.policy, &self.ocr.classes)
    }

    pub fn min_interval(&self) -> Duration {
        self.feedback
            .min_interval
            .unwrap_or_else(|| self.feedback.mode.default_interval())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
