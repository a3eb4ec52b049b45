//! Speech output channels and the phrases spoken through them.

mod command;
mod phrases;

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::Language;

pub use command::CommandSpeech;
pub use phrases::Phrasebook;

/// A text-to-speech channel.
///
/// `speak` may fail when the channel is busy or broken; callers log and drop
/// the utterance. `stop` silences the channel immediately and is idempotent.
pub trait SpeechSink: Send {
    /// Start speaking `text` and return without waiting for playback.
    ///
    /// Must not block: the feedback scheduler holds its state lock across this
    /// call, and concurrent offers are dropped as contended while it is held.
    /// Report playback through `is_speaking` instead.
    fn speak(&mut self, text: &str) -> Result<()>;

    fn stop(&mut self);

    fn is_speaking(&mut self) -> bool;

    fn set_language(&mut self, _language: Language) -> Result<()> {
        Ok(())
    }

    fn set_rate(&mut self, _rate: f32) -> Result<()> {
        Ok(())
    }
}

/// Writes utterances to the log instead of a speaker.
#[derive(Debug, Default)]
pub struct LogSpeech {
    language: Language,
}

impl SpeechSink for LogSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("[speech:{}] {}", self.language, text);
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_speaking(&mut self) -> bool {
        false
    }

    fn set_language(&mut self, language: Language) -> Result<()> {
        self.language = language;
        Ok(())
    }
}

/// In-memory sink that records utterances. Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
    stops: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|spoken| spoken.clone())
            .unwrap_or_default()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Pretend an utterance is still playing.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Make every `speak` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SpeechSink for RecordingSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("speech engine unavailable"));
        }
        self.spoken
            .lock()
            .map_err(|_| anyhow!("speech record poisoned"))?
            .push(text.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }

    fn is_speaking(&mut self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_clones_share_state() {
        let speech = RecordingSpeech::new();
        let mut sink = speech.clone();
        sink.speak("door, close").unwrap();
        sink.stop();
        assert_eq!(speech.spoken(), vec!["door, close".to_string()]);
        assert_eq!(speech.stop_count(), 1);

        speech.set_failing(true);
        assert!(sink.speak("again").is_err());
        assert_eq!(speech.spoken().len(), 1);
    }
}
