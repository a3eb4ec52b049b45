use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::tensor::RawDetectionTensor;
use crate::frame::RgbFrame;

/// Backend that replays prepared detector outputs, cycling through them.
///
/// Used by the synthetic demo source and by tests; it ignores frame content.
pub struct ScriptedDetector {
    outputs: Vec<RawDetectionTensor>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn new(outputs: Vec<RawDetectionTensor>) -> Self {
        Self { outputs, cursor: 0 }
    }

    /// A backend that always returns the same tensor.
    pub fn fixed(output: RawDetectionTensor) -> Self {
        Self::new(vec![output])
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &RgbFrame) -> Result<RawDetectionTensor> {
        if self.outputs.is_empty() {
            return Err(anyhow!("scripted detector has no outputs"));
        }
        let output = self.outputs[self.cursor % self.outputs.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(output)
    }
}
