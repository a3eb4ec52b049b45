//! Whole-frame scene classification (Places365-style categories).
//!
//! Used two ways: a one-shot announcement when assist mode starts, and the
//! dedicated scene mode that keeps naming the current place.

mod backend;
pub mod backends;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::detect::LabelSet;
use crate::frame::RgbFrame;
use crate::Language;

pub use backend::SceneBackend;
pub use backends::ScriptedScene;
#[cfg(feature = "backend-tract")]
pub use backends::TractScene;

/// Minimum confidence for the assist-mode announcement (exclusive).
pub const ANNOUNCE_CONFIDENCE: f32 = 0.2;
/// Minimum confidence for scene-mode feedback (exclusive).
pub const READ_CONFIDENCE: f32 = 0.4;

/// Top-1 scene category of a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneGuess {
    pub label: String,
    pub confidence: f32,
}

/// Numerically stable softmax. Empty input gives an empty output.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|value| value / sum).collect()
}

/// Index and value of the largest probability. The first index wins ties.
pub fn top1(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (index, value)| match best {
            Some((_, best_value)) if value.total_cmp(&best_value).is_le() => best,
            _ => Some((index, value)),
        })
}

/// Load `scene_labels_<lang>.txt` from a labels directory.
pub fn labels_for_language<P: AsRef<Path>>(dir: P, language: Language) -> Result<LabelSet> {
    LabelSet::load_categories(
        dir.as_ref()
            .join(format!("scene_labels_{}.txt", language.code())),
    )
}

/// A loaded scene model with its category names.
pub struct SceneClassifier {
    backend: Option<Box<dyn SceneBackend>>,
    labels: LabelSet,
}

impl SceneClassifier {
    pub fn new<B: SceneBackend + 'static>(backend: B, labels: LabelSet) -> Self {
        log::info!(
            "scene backend '{}' ready with {} categories",
            backend.name(),
            labels.len()
        );
        Self {
            backend: Some(Box::new(backend)),
            labels,
        }
    }

    pub fn set_labels(&mut self, labels: LabelSet) {
        self.labels = labels;
    }

    /// Most likely scene, or `None` when the model produced no logits.
    pub fn classify(&mut self, frame: &RgbFrame) -> Result<Option<SceneGuess>> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| anyhow!("scene classifier has been closed"))?;
        let logits = backend
            .classify(frame)
            .context("scene classification failed")?;
        if logits.iter().any(|logit| !logit.is_finite()) {
            return Err(anyhow!("scene model produced non-finite logits"));
        }
        let probabilities = softmax(&logits);
        Ok(top1(&probabilities).map(|(index, confidence)| SceneGuess {
            label: self.labels.name(index),
            confidence,
        }))
    }

    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            log::info!("scene backend '{}' released", backend.name());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }
}

/// Shared switch for the one-shot assist announcement. Clones share state.
///
/// Armed when created; the pipeline disarms it on the first frame it
/// classifies, and `rearm` asks for a new announcement.
#[derive(Clone, Debug)]
pub struct SceneTrigger {
    armed: Arc<AtomicBool>,
}

impl SceneTrigger {
    pub fn new() -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn rearm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Disarm, returning whether the trigger was armed.
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}

impl Default for SceneTrigger {
    fn default() -> Self {
        Self::new()
    }
}
