//! Detector diagnostics.
//!
//! The detector reports what it does through a `DetectorObserver` it owns.
//! Production code uses `TracingObserver`; tests use `RecordingObserver` and
//! assert on the recorded events.

use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, trace, warn, Level};

use super::verdict::Verdict;
use crate::vad::FrameClass;

/// Something noteworthy that happened while processing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    /// One frame was labelled.
    Classified { class: FrameClass, frame_ms: u32 },
    /// Silence crossed `between_words_silence`; the word phase is now IN_SILENCE.
    EnteredSilence { silence_ms: u32 },
    /// A voiced run after silence reached `min_word_length`.
    WordDetected { words: u32 },
    /// Confirmed voice cleared a non-zero silence run.
    TalkDetected { previous_silence_ms: u32 },
    /// First confirmed word: initial silence is over, the greeting has begun.
    GreetingStarted { voice_ms: u32 },
    /// The sample budget ran out before the frame could be analysed.
    BudgetExhausted { total_analysis_time: u32 },
    /// An exit condition fired. `measured` crossed `limit`.
    Verdict {
        verdict: Verdict,
        measured: u32,
        limit: u32,
    },
}

impl DetectorEvent {
    pub fn level(&self) -> Level {
        match self {
            DetectorEvent::Classified { .. } => Level::TRACE,
            DetectorEvent::EnteredSilence { .. }
            | DetectorEvent::WordDetected { .. }
            | DetectorEvent::TalkDetected { .. }
            | DetectorEvent::GreetingStarted { .. } => Level::DEBUG,
            DetectorEvent::BudgetExhausted { .. } | DetectorEvent::Verdict { .. } => Level::INFO,
        }
    }
}

impl fmt::Display for DetectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorEvent::Classified { class, frame_ms } => {
                write!(f, "{class:?} frame ({frame_ms}ms)")
            }
            DetectorEvent::EnteredSilence { silence_ms } => {
                write!(f, "changed state to IN_SILENCE (silence_duration: {silence_ms}ms)")
            }
            DetectorEvent::WordDetected { words } => write!(f, "word detected (words: {words})"),
            DetectorEvent::TalkDetected {
                previous_silence_ms,
            } => write!(
                f,
                "detected talk, previous silence duration: {previous_silence_ms}ms"
            ),
            DetectorEvent::GreetingStarted { voice_ms } => {
                write!(f, "greeting started (voice_duration: {voice_ms}ms)")
            }
            DetectorEvent::BudgetExhausted {
                total_analysis_time,
            } => write!(
                f,
                "analysis budget exhausted (total_analysis_time: {total_analysis_time}ms)"
            ),
            DetectorEvent::Verdict {
                verdict,
                measured,
                limit,
            } => write!(f, "{verdict} ({measured} >= {limit})"),
        }
    }
}

/// Sink for detector events.
pub trait DetectorObserver: Send + 'static {
    fn on_event(&mut self, event: &DetectorEvent);
}

/// Forwards events to `tracing`, dropping those above `max_level`.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    max_level: LevelFilter,
}

impl TracingObserver {
    pub fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    pub fn set_max_level(&mut self, max_level: LevelFilter) {
        self.max_level = max_level;
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(LevelFilter::DEBUG)
    }
}

impl DetectorObserver for TracingObserver {
    fn on_event(&mut self, event: &DetectorEvent) {
        let level = event.level();
        if level > self.max_level {
            return;
        }
        match level {
            Level::TRACE => trace!("AMD: {event}"),
            Level::DEBUG => debug!("AMD: {event}"),
            Level::INFO => info!("AMD: {event}"),
            Level::WARN => warn!("AMD: {event}"),
            _ => error!("AMD: {event}"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub events: Vec<DetectorEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events at or more severe than `max_level`.
    pub fn at_level(&self, max_level: Level) -> impl Iterator<Item = &DetectorEvent> {
        self.events.iter().filter(move |e| e.level() <= max_level)
    }
}

impl DetectorObserver for RecordingObserver {
    fn on_event(&mut self, event: &DetectorEvent) {
        self.events.push(event.clone());
    }
}
