use anyhow::Result;

use crate::frame::RgbFrame;

/// Scene classification backend.
///
/// Returns raw class logits for a full frame; probabilities and the top class
/// are computed by `SceneClassifier`.
pub trait SceneBackend: Send {
    fn name(&self) -> &'static str;

    fn classify(&mut self, frame: &RgbFrame) -> Result<Vec<f32>>;
}
