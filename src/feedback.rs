//! Rate-limited spoken feedback.
//!
//! `FeedbackScheduler::offer` is called once per processed frame. It speaks at
//! most once per `min_interval`; everything in between is dropped, not queued.
//!
//! The gate is checked twice: first lock-free against an atomic copy of the
//! last speech time, then authoritatively under the state lock. Contention on
//! the lock is itself a drop.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::aggregate::FrameResult;
use crate::depth::Distance;
use crate::speech::{Phrasebook, SpeechSink};
use crate::Language;

pub const DEFAULT_MAX_OBJECTS: usize = 3;

const NEVER_SPOKEN: u64 = u64::MAX;

// -------------------- Clock --------------------

/// Monotonic time source, as a duration since an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for tests and replays. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.millis.store(now.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

// -------------------- Mode --------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// Objects, distances and text.
    #[default]
    Assist,
    /// Center-of-view distance only.
    DepthOnly,
    /// Text in the whole frame.
    Read,
    /// Scene category of the whole frame.
    Scene,
}

impl FeedbackMode {
    pub fn default_interval(self) -> Duration {
        match self {
            FeedbackMode::Assist => Duration::from_secs(3),
            FeedbackMode::DepthOnly => Duration::from_secs(2),
            FeedbackMode::Read => Duration::from_secs(3),
            FeedbackMode::Scene => Duration::from_secs(2),
        }
    }
}

impl FromStr for FeedbackMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assist" => Ok(FeedbackMode::Assist),
            "depth" | "depth_only" | "depth-only" => Ok(FeedbackMode::DepthOnly),
            "read" => Ok(FeedbackMode::Read),
            "scene" => Ok(FeedbackMode::Scene),
            other => Err(anyhow!(
                "unknown feedback mode '{}' (expected assist, depth_only, read or scene)",
                other
            )),
        }
    }
}

// -------------------- Scheduler --------------------

/// What `offer` did with a frame result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OfferOutcome {
    Spoken(String),
    /// Inside the minimum interval.
    Throttled,
    /// Another offer held the lock.
    Contended,
    /// Nothing worth saying.
    Empty,
    /// The gate passed but the speech channel refused.
    SpeechFailed,
    /// The scheduler was halted for shutdown.
    Halted,
}

#[derive(Debug, Default)]
struct UtteranceState {
    last_spoken_at: Option<Duration>,
    pending: VecDeque<String>,
}

struct Inner {
    state: UtteranceState,
    sink: Box<dyn SpeechSink>,
    phrasebook: &'static Phrasebook,
}

pub struct FeedbackScheduler {
    inner: Mutex<Inner>,
    last_spoken_nanos: AtomicU64,
    halted: AtomicBool,
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    max_objects: usize,
}

impl FeedbackScheduler {
    pub fn new(sink: Box<dyn SpeechSink>, mode: FeedbackMode) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: UtteranceState::default(),
                sink,
                phrasebook: Phrasebook::for_language(Language::default()),
            }),
            last_spoken_nanos: AtomicU64::new(NEVER_SPOKEN),
            halted: AtomicBool::new(false),
            clock: Arc::new(MonotonicClock::new()),
            min_interval: mode.default_interval(),
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = max_objects.max(1);
        self
    }

    pub fn with_language(self, language: Language) -> Result<Self> {
        self.set_language(language)?;
        Ok(self)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Speak the first results of a frame, if the gate allows.
    pub fn offer(&self, frame: &FrameResult) -> OfferOutcome {
        if frame.results.is_empty() {
            return OfferOutcome::Empty;
        }
        self.gated(|phrasebook, max_objects| {
            frame
                .results
                .iter()
                .take(max_objects)
                .map(|result| phrasebook.describe(result))
                .collect::<Vec<_>>()
                .join(". ")
        })
    }

    /// Speak the center-of-view distance (depth-only mode).
    pub fn offer_center(&self, distance: Distance) -> OfferOutcome {
        self.gated(|phrasebook, _| phrasebook.describe_center(distance))
    }

    /// Speak free text (read and scene modes). Blank text is `Empty` and
    /// leaves the gate untouched.
    pub fn offer_text(&self, text: &str) -> OfferOutcome {
        let text = text.trim();
        if text.is_empty() {
            return OfferOutcome::Empty;
        }
        self.gated(|_, _| text.to_string())
    }

    /// One-shot scene announcement, e.g. `"You are in kitchen"`.
    ///
    /// Skips the interval gate but still consumes it, so object feedback
    /// waits a full interval behind the announcement.
    pub fn announce_scene(&self, label: &str) -> OfferOutcome {
        let label = label.trim();
        if label.is_empty() {
            return OfferOutcome::Empty;
        }
        let now = self.clock.now();
        let mut inner = self.lock_inner();
        if self.halted.load(Ordering::Acquire) {
            return OfferOutcome::Halted;
        }
        let message = inner.phrasebook.describe_scene(label);
        self.speak_locked(&mut inner, now, message)
    }

    fn gated(&self, compose: impl FnOnce(&Phrasebook, usize) -> String) -> OfferOutcome {
        let now = self.clock.now();
        if !self.gate_open(self.last_spoken_nanos.load(Ordering::Acquire), now) {
            return OfferOutcome::Throttled;
        }

        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return OfferOutcome::Contended,
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("feedback state was poisoned; recovering");
                poisoned.into_inner()
            }
        };

        if self.halted.load(Ordering::Acquire) {
            return OfferOutcome::Halted;
        }
        let last = inner
            .state
            .last_spoken_at
            .map_or(NEVER_SPOKEN, |at| at.as_nanos() as u64);
        if !self.gate_open(last, now) {
            return OfferOutcome::Throttled;
        }
        let message = compose(inner.phrasebook, self.max_objects);
        self.speak_locked(&mut inner, now, message)
    }

    fn speak_locked(&self, inner: &mut Inner, now: Duration, message: String) -> OfferOutcome {
        // The slot is consumed even if speech fails below.
        inner.state.last_spoken_at = Some(now);
        self.last_spoken_nanos
            .store(now.as_nanos() as u64, Ordering::Release);

        if message.is_empty() {
            return OfferOutcome::Empty;
        }

        if !inner.sink.is_speaking() {
            inner.state.pending.clear();
        }
        match inner.sink.speak(&message) {
            Ok(()) => {
                log::debug!("speaking: {}", message);
                inner.state.pending.push_back(message.clone());
                OfferOutcome::Spoken(message)
            }
            Err(err) => {
                log::warn!("speech failed, dropping utterance: {:#}", err);
                OfferOutcome::SpeechFailed
            }
        }
    }

    fn gate_open(&self, last_nanos: u64, now: Duration) -> bool {
        if last_nanos == NEVER_SPOKEN {
            return true;
        }
        let elapsed = now.saturating_sub(Duration::from_nanos(last_nanos));
        elapsed >= self.min_interval
    }

    /// Silence the speech channel and forget pending utterances. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.lock_inner();
        inner.state.pending.clear();
        inner.state.last_spoken_at = None;
        self.last_spoken_nanos.store(NEVER_SPOKEN, Ordering::Release);
        inner.sink.stop();
    }

    /// Stop speech for good: every later offer returns `Halted`.
    ///
    /// An offer already speaking when this is called is cut off by the
    /// sink's `stop`.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.stop();
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        let mut inner = self.lock_inner();
        inner.phrasebook = Phrasebook::for_language(language);
        inner.sink.set_language(language)
    }

    pub fn set_rate(&self, rate: f32) -> Result<()> {
        self.lock_inner().sink.set_rate(rate)
    }

    /// Utterances handed to the sink that may still be playing.
    pub fn pending(&self) -> Vec<String> {
        self.lock_inner().state.pending.iter().cloned().collect()
    }

    pub fn last_spoken_at(&self) -> Option<Duration> {
        self.lock_inner().state.last_spoken_at
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PerceptionResult;
    use crate::depth::DistanceScale;
    use crate::detect::BoundingBox;
    use crate::speech::RecordingSpeech;

    fn frame(labels: &[&str]) -> FrameResult {
        FrameResult {
            results: labels
                .iter()
                .map(|label| PerceptionResult {
                    bounding_box: BoundingBox::from_center(
                        0.5,
                        0.5,
                        0.2,
                        0.2,
                        0.9,
                        0,
                        label.to_string(),
                    ),
                    distance: Distance::Scale(DistanceScale::new(1)),
                    recognized_text: None,
                })
                .collect(),
            ..FrameResult::default()
        }
    }

    fn scheduler(mode: FeedbackMode) -> (FeedbackScheduler, RecordingSpeech, ManualClock) {
        let speech = RecordingSpeech::new();
        let clock = ManualClock::new();
        let scheduler = FeedbackScheduler::new(Box::new(speech.clone()), mode)
            .with_clock(Arc::new(clock.clone()));
        (scheduler, speech, clock)
    }

    #[test]
    fn gate_drops_offers_inside_interval() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Assist);
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
        clock.advance(Duration::from_millis(2999));
        assert_eq!(scheduler.offer(&frame(&["door"])), OfferOutcome::Throttled);
        clock.advance(Duration::from_millis(1));
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
        assert_eq!(speech.spoken().len(), 2);
    }

    #[test]
    fn empty_frames_do_not_consume_the_slot() {
        let (scheduler, speech, _clock) = scheduler(FeedbackMode::Assist);
        assert_eq!(scheduler.offer(&FrameResult::default()), OfferOutcome::Empty);
        assert_eq!(scheduler.last_spoken_at(), None);
        assert!(matches!(scheduler.offer(&frame(&["cup"])), OfferOutcome::Spoken(_)));
        assert_eq!(speech.spoken(), vec!["cup, very close".to_string()]);
    }

    #[test]
    fn speech_failure_still_consumes_the_slot() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Assist);
        speech.set_failing(true);
        assert_eq!(scheduler.offer(&frame(&["cup"])), OfferOutcome::SpeechFailed);
        speech.set_failing(false);
        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.offer(&frame(&["cup"])), OfferOutcome::Throttled);
    }

    #[test]
    fn contended_lock_is_a_drop() {
        let (scheduler, speech, _clock) = scheduler(FeedbackMode::Assist);
        let guard = scheduler.inner.lock().unwrap();
        assert_eq!(scheduler.offer(&frame(&["cup"])), OfferOutcome::Contended);
        drop(guard);
        assert!(speech.spoken().is_empty());
        assert_eq!(scheduler.last_spoken_at(), None);
    }

    #[test]
    fn state_lock_is_free_while_sink_still_plays() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Assist);
        speech.set_busy(true);
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
        assert!(scheduler.inner.try_lock().is_ok());
        clock.advance(Duration::from_secs(3));
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
    }

    #[test]
    fn depth_only_interval_and_center_phrase() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::DepthOnly);
        assert_eq!(scheduler.min_interval(), Duration::from_secs(2));
        let near = Distance::Scale(DistanceScale::new(4));
        assert_eq!(
            scheduler.offer_center(near),
            OfferOutcome::Spoken("close, scale 4".to_string())
        );
        clock.advance(Duration::from_secs(2));
        assert!(matches!(scheduler.offer_center(Distance::Unknown), OfferOutcome::Spoken(_)));
        assert_eq!(speech.spoken()[1], "distance unavailable");
    }

    #[test]
    fn stop_resets_gate_and_pending() {
        let (scheduler, speech, _clock) = scheduler(FeedbackMode::Assist);
        speech.set_busy(true);
        scheduler.offer(&frame(&["door"]));
        assert_eq!(scheduler.pending().len(), 1);
        scheduler.stop();
        scheduler.stop();
        assert!(scheduler.pending().is_empty());
        assert_eq!(speech.stop_count(), 2);
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
    }

    #[test]
    fn halt_is_permanent() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Assist);
        scheduler.halt();
        clock.advance(Duration::from_secs(10));
        assert_eq!(scheduler.offer(&frame(&["door"])), OfferOutcome::Halted);
        assert!(scheduler.is_halted());
        assert!(speech.spoken().is_empty());
        assert_eq!(speech.stop_count(), 1);
    }

    #[test]
    fn language_switch_changes_phrases() {
        let (scheduler, speech, _clock) = scheduler(FeedbackMode::Assist);
        scheduler.set_language(Language::Sl).unwrap();
        scheduler.offer(&frame(&["vrata"]));
        assert_eq!(speech.spoken(), vec!["vrata, zelo blizu".to_string()]);
    }

    #[test]
    fn text_offers_skip_blank_text() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Read);
        assert_eq!(scheduler.offer_text("  "), OfferOutcome::Empty);
        assert_eq!(scheduler.last_spoken_at(), None);
        assert_eq!(
            scheduler.offer_text(" EXIT "),
            OfferOutcome::Spoken("EXIT".to_string())
        );
        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.offer_text("EXIT"), OfferOutcome::Throttled);
        assert_eq!(speech.spoken(), vec!["EXIT".to_string()]);
    }

    #[test]
    fn scene_announcement_bypasses_but_consumes_the_gate() {
        let (scheduler, speech, clock) = scheduler(FeedbackMode::Assist);
        assert!(matches!(scheduler.offer(&frame(&["door"])), OfferOutcome::Spoken(_)));
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            scheduler.announce_scene("kitchen"),
            OfferOutcome::Spoken("You are in kitchen".to_string())
        );
        clock.advance(Duration::from_secs(2));
        assert_eq!(scheduler.offer(&frame(&["door"])), OfferOutcome::Throttled);
        scheduler.halt();
        assert_eq!(scheduler.announce_scene("kitchen"), OfferOutcome::Halted);
        assert_eq!(speech.spoken().len(), 2);
    }

    #[test]
    fn mode_parses() {
        assert_eq!("read".parse::<FeedbackMode>().unwrap(), FeedbackMode::Read);
        assert_eq!(" Scene".parse::<FeedbackMode>().unwrap(), FeedbackMode::Scene);
        assert_eq!(FeedbackMode::Scene.default_interval(), Duration::from_secs(2));
        assert_eq!("depth".parse::<FeedbackMode>().unwrap(), FeedbackMode::DepthOnly);
        assert_eq!("Assist".parse::<FeedbackMode>().unwrap(), FeedbackMode::Assist);
        assert!("loud".parse::<FeedbackMode>().is_err());
    }
}
