use anyhow::Result;

use super::tensor::RawDetectionTensor;
use crate::frame::RgbFrame;

/// Detector backend trait.
///
/// A backend owns a loaded detection model. It receives a normalized RGB frame
/// and returns the model's raw output; decoding, thresholding and suppression
/// happen in `Detector`, not in the backend.
///
/// The returned tensor MUST be shaped `[1, 4 + num_classes, num_anchors]` with
/// geometry rows in normalized image coordinates.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a frame.
    ///
    /// Implementations resize the frame to their model input themselves and
    /// must not retain it beyond this call.
    fn infer(&mut self, frame: &RgbFrame) -> Result<RawDetectionTensor>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
