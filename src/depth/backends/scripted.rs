use anyhow::{anyhow, Result};

use crate::depth::backend::DepthBackend;
use crate::depth::tensor::DepthTensor;
use crate::frame::RgbFrame;

/// Backend that replays prepared depth maps, or fails on every frame.
pub struct ScriptedDepth {
    maps: Vec<DepthTensor>,
    cursor: usize,
    failure: Option<String>,
}

impl ScriptedDepth {
    pub fn new(maps: Vec<DepthTensor>) -> Self {
        Self {
            maps,
            cursor: 0,
            failure: None,
        }
    }

    pub fn fixed(map: DepthTensor) -> Self {
        Self::new(vec![map])
    }

    /// A backend whose inference always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            maps: Vec::new(),
            cursor: 0,
            failure: Some(message.into()),
        }
    }
}

impl DepthBackend for ScriptedDepth {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn estimate(&mut self, _frame: &RgbFrame) -> Result<DepthTensor> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        if self.maps.is_empty() {
            return Err(anyhow!("scripted depth has no maps"));
        }
        let map = self.maps[self.cursor % self.maps.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(map)
    }
}
