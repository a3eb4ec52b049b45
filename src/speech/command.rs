use anyhow::{anyhow, Context, Result};
use std::process::{Child, Command, Stdio};

use super::SpeechSink;
use crate::Language;

const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Speaks by spawning an external TTS program (e.g. `espeak-ng`) per utterance.
///
/// Arguments may contain `{lang}`, `{rate}`, `{wpm}` and `{text}` placeholders.
/// Without a `{text}` placeholder the text is appended as the last argument.
/// The channel is busy while the child runs; `stop` kills it.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    language: Language,
    rate: f32,
    child: Option<Child>,
}

impl CommandSpeech {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("speech command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            language: Language::default(),
            rate: 1.0,
            child: None,
        })
    }

    /// Split a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        Self::new(&parts)
    }

    fn render_args(&self, text: &str) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * self.rate).round() as u32;
        let mut has_text = false;
        let mut rendered: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                has_text |= arg.contains("{text}");
                arg.replace("{lang}", self.language.code())
                    .replace("{rate}", &self.rate.to_string())
                    .replace("{wpm}", &wpm.to_string())
                    .replace("{text}", text)
            })
            .collect();
        if !has_text {
            rendered.push(text.to_string());
        }
        rendered
    }
}

impl SpeechSink for CommandSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        if self.is_speaking() {
            return Err(anyhow!("speech channel busy"));
        }
        let child = Command::new(&self.program)
            .args(self.render_args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn speech command '{}'", self.program))?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                log::debug!("speech child already finished: {}", err);
            }
            let _ = child.wait();
        }
    }

    fn is_speaking(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    log::warn!("speech command exited with {}", status);
                }
                self.child = None;
                false
            }
            Ok(None) => true,
            Err(err) => {
                log::warn!("failed to poll speech command: {}", err);
                self.child = None;
                false
            }
        }
    }

    fn set_language(&mut self, language: Language) -> Result<()> {
        self.language = language;
        Ok(())
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(anyhow!("speech rate must be positive, got {}", rate));
        }
        self.rate = rate;
        Ok(())
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.stop();
    }
}
