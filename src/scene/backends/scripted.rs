use anyhow::{anyhow, Result};

use crate::frame::RgbFrame;
use crate::scene::backend::SceneBackend;

/// Backend that replays prepared logits, or fails on every frame.
pub struct ScriptedScene {
    logits: Vec<Vec<f32>>,
    cursor: usize,
    failure: Option<String>,
}

impl ScriptedScene {
    pub fn new(logits: Vec<Vec<f32>>) -> Self {
        Self {
            logits,
            cursor: 0,
            failure: None,
        }
    }

    pub fn fixed(logits: Vec<f32>) -> Self {
        Self::new(vec![logits])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            logits: Vec::new(),
            cursor: 0,
            failure: Some(message.into()),
        }
    }
}

impl SceneBackend for ScriptedScene {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn classify(&mut self, _frame: &RgbFrame) -> Result<Vec<f32>> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        if self.logits.is_empty() {
            return Err(anyhow!("scripted scene has no logits"));
        }
        let logits = self.logits[self.cursor % self.logits.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(logits)
    }
}
