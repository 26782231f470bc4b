//! Voice-activity / greeting state machine.
//!
//! ## Per-frame flow
//!
//! ```text
//! feed(frame)
//!   1. budget.consume(samples)    exhausted → NOT_SURE / TOO_LONG
//!   2. frame_ms = 1000 / (rate / samples)
//!   3. classifier.classify(frame) → VOICED | SILENCE
//!   4. process_frame(class, frame_ms)
//! ```
//!
//! Exit conditions are evaluated in a fixed order and the first one that
//! matches wins. A single long utterance therefore reports MAX_WORD_LENGTH
//! even if it also exceeds the greeting.
//!
//! Once a verdict is produced the detector is terminal: later frames return
//! the same verdict and leave the state untouched.

pub mod budget;
pub mod observer;
pub mod verdict;

pub use budget::AnalysisBudget;
pub use observer::{DetectorEvent, DetectorObserver, RecordingObserver, TracingObserver};
pub use verdict::{AmdCause, AmdResult, Verdict};

use crate::audio::AudioFrame;
use crate::config::AmdParams;
use crate::error::{AmdError, Result};
use crate::vad::{energy::EnergyClassifier, FrameClass, FrameClassifier};

/// Voice/silence micro-state used to find word boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordPhase {
    InWord,
    InSilence,
}

/// Snapshot of one call's detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorState {
    pub word_phase: WordPhase,
    /// True until voice is first sustained for `min_word_length`.
    pub in_initial_silence: bool,
    /// True from the first confirmed word until a verdict.
    pub in_greeting: bool,
    pub silence_duration: u32,
    pub voice_duration: u32,
    pub words: u32,
    /// Duration of the most recent frame.
    pub frame_duration_ms: u32,
    /// Frames that went through `process_frame`.
    pub frames: u64,
    pub voiced_frames: u64,
    /// Sum of the durations of all processed frames.
    pub elapsed_ms: u64,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            word_phase: WordPhase::InWord,
            in_initial_silence: true,
            in_greeting: false,
            silence_duration: 0,
            voice_duration: 0,
            words: 0,
            frame_duration_ms: 0,
            frames: 0,
            voiced_frames: 0,
            elapsed_ms: 0,
        }
    }
}

/// What the caller should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No exit condition fired; send the next frame.
    Continue,
    /// Analysis is over.
    Verdict(Verdict),
}

impl FrameOutcome {
    pub fn verdict(self) -> Option<Verdict> {
        match self {
            FrameOutcome::Continue => None,
            FrameOutcome::Verdict(v) => Some(v),
        }
    }
}

/// An exit condition that fired, with the value that crossed its limit.
struct Exit {
    verdict: Verdict,
    measured: u32,
    limit: u32,
}

/// Per-call answering-machine detector.
pub struct Detector<O: DetectorObserver = TracingObserver> {
    params: AmdParams,
    classifier: Box<dyn FrameClassifier>,
    budget: AnalysisBudget,
    state: DetectorState,
    observer: O,
    verdict: Option<Verdict>,
}

impl Detector<TracingObserver> {
    /// Detector for a stream at `sample_rate`, logging through `tracing`.
    ///
    /// # Errors
    /// `AmdError::InvalidSampleRate` if `sample_rate` is 0.
    pub fn new(params: AmdParams, sample_rate: u32) -> Result<Self> {
        Self::with_observer(params, sample_rate, TracingObserver::default())
    }
}

impl<O: DetectorObserver> Detector<O> {
    pub fn with_observer(params: AmdParams, sample_rate: u32, observer: O) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AmdError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            classifier: Box::new(EnergyClassifier::new(params.silence_threshold)),
            budget: AnalysisBudget::new(params.total_analysis_time, sample_rate),
            params,
            state: DetectorState::default(),
            observer,
            verdict: None,
        })
    }

    /// Replace the default energy classifier.
    pub fn with_classifier(mut self, classifier: impl FrameClassifier) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Budget check, classification and state update for one raw frame.
    pub fn feed(&mut self, frame: &AudioFrame) -> FrameOutcome {
        if let Some(verdict) = self.verdict {
            return FrameOutcome::Verdict(verdict);
        }

        if self.budget.consume(frame.sample_count()) {
            self.observer.on_event(&DetectorEvent::BudgetExhausted {
                total_analysis_time: self.params.total_analysis_time,
            });
            let verdict = Verdict::too_long();
            self.verdict = Some(verdict);
            return FrameOutcome::Verdict(verdict);
        }

        let frame_ms = frame.duration_ms();
        let class = self.classifier.classify(frame);
        self.process_frame(class, frame_ms)
    }

    /// Advance the state machine by one classified frame.
    pub fn process_frame(&mut self, class: FrameClass, frame_ms: u32) -> FrameOutcome {
        if let Some(verdict) = self.verdict {
            return FrameOutcome::Verdict(verdict);
        }

        self.state.frame_duration_ms = frame_ms;
        self.state.frames += 1;
        self.state.elapsed_ms += u64::from(frame_ms);
        if class.is_voiced() {
            self.state.voiced_frames += 1;
        }
        self.observer
            .on_event(&DetectorEvent::Classified { class, frame_ms });

        let exit = match class {
            FrameClass::Silence => self.on_silence(frame_ms),
            FrameClass::Voiced => self.on_voiced(frame_ms),
        };

        match exit {
            Some(exit) => {
                self.observer.on_event(&DetectorEvent::Verdict {
                    verdict: exit.verdict,
                    measured: exit.measured,
                    limit: exit.limit,
                });
                self.verdict = Some(exit.verdict);
                FrameOutcome::Verdict(exit.verdict)
            }
            None => FrameOutcome::Continue,
        }
    }

    fn on_silence(&mut self, frame_ms: u32) -> Option<Exit> {
        let params = &self.params;
        let state = &mut self.state;

        state.silence_duration = state.silence_duration.saturating_add(frame_ms);

        if state.silence_duration >= params.between_words_silence {
            if state.word_phase != WordPhase::InSilence {
                self.observer.on_event(&DetectorEvent::EnteredSilence {
                    silence_ms: state.silence_duration,
                });
            }
            state.word_phase = WordPhase::InSilence;
            state.voice_duration = 0;
        }

        if state.in_initial_silence && state.silence_duration >= params.initial_silence {
            let result = if params.silence_not_sure {
                AmdResult::NotSure
            } else {
                AmdResult::Machine
            };
            return Some(Exit {
                verdict: Verdict::new(result, AmdCause::InitialSilence),
                measured: state.silence_duration,
                limit: params.initial_silence,
            });
        }

        if state.in_greeting && state.silence_duration >= params.after_greeting_silence {
            return Some(Exit {
                verdict: Verdict::new(AmdResult::Human, AmdCause::SilenceAfterGreeting),
                measured: state.silence_duration,
                limit: params.after_greeting_silence,
            });
        }

        None
    }

    fn on_voiced(&mut self, frame_ms: u32) -> Option<Exit> {
        let params = &self.params;
        let state = &mut self.state;

        state.voice_duration = state.voice_duration.saturating_add(frame_ms);
        let word_long = state.voice_duration >= params.minimum_word_length;

        if word_long && state.word_phase == WordPhase::InSilence {
            state.words = state.words.saturating_add(1);
            state.word_phase = WordPhase::InWord;
            self.observer
                .on_event(&DetectorEvent::WordDetected { words: state.words });
        }

        if state.voice_duration >= params.maximum_word_length {
            return Some(Exit {
                verdict: Verdict::new(AmdResult::Machine, AmdCause::MaxWordLength),
                measured: state.voice_duration,
                limit: params.maximum_word_length,
            });
        }

        if state.words >= params.maximum_number_of_words {
            return Some(Exit {
                verdict: Verdict::new(AmdResult::Machine, AmdCause::MaxWords),
                measured: state.words,
                limit: params.maximum_number_of_words,
            });
        }

        if state.in_greeting && state.voice_duration >= params.greeting {
            return Some(Exit {
                verdict: Verdict::new(AmdResult::Machine, AmdCause::LongGreeting),
                measured: state.voice_duration,
                limit: params.greeting,
            });
        }

        if word_long {
            if state.silence_duration > 0 {
                self.observer.on_event(&DetectorEvent::TalkDetected {
                    previous_silence_ms: state.silence_duration,
                });
            }
            state.silence_duration = 0;

            if !state.in_greeting {
                state.in_initial_silence = false;
                state.in_greeting = true;
                self.observer.on_event(&DetectorEvent::GreetingStarted {
                    voice_ms: state.voice_duration,
                });
            }
        }

        None
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn params(&self) -> &AmdParams {
        &self.params
    }

    pub fn budget(&self) -> &AnalysisBudget {
        &self.budget
    }

    /// The verdict, once one has been produced.
    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }
}

impl<O: DetectorObserver + std::fmt::Debug> std::fmt::Debug for Detector<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("params", &self.params)
            .field("budget", &self.budget)
            .field("state", &self.state)
            .field("verdict", &self.verdict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    fn detector(params: AmdParams) -> Detector<RecordingObserver> {
        Detector::with_observer(params, RATE, RecordingObserver::new()).expect("detector")
    }

    fn run(d: &mut Detector<RecordingObserver>, class: FrameClass, frames: usize) -> FrameOutcome {
        let mut outcome = FrameOutcome::Continue;
        for _ in 0..frames {
            outcome = d.process_frame(class, 20);
            if outcome != FrameOutcome::Continue {
                break;
            }
        }
        outcome
    }

    #[test]
    fn sub_khz_stream_is_analysed() {
        let mut d = Detector::new(AmdParams::default(), 800).expect("detector");
        let outcome = d.feed(&AudioFrame::constant(0, 20, 800));
        assert_eq!(outcome, FrameOutcome::Continue);
        assert_eq!(d.state().frames, 1);
        assert_eq!(d.state().silence_duration, 20);
    }

    #[test]
    fn starts_in_initial_silence() {
        let d = detector(AmdParams::default());
        let s = d.state();
        assert_eq!(s.word_phase, WordPhase::InWord);
        assert!(s.in_initial_silence);
        assert!(!s.in_greeting);
        assert_eq!((s.silence_duration, s.voice_duration, s.words), (0, 0, 0));
        assert_eq!(d.budget().remaining(), Some(40_000));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = Detector::new(AmdParams::default(), 0).unwrap_err();
        assert!(matches!(err, AmdError::InvalidSampleRate(0)));
    }

    #[test]
    fn silence_switches_to_in_silence_and_clears_voice() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Voiced, 2);
        assert_eq!(d.state().voice_duration, 40);
        run(&mut d, FrameClass::Silence, 3);
        let s = d.state();
        assert_eq!(s.word_phase, WordPhase::InSilence);
        assert_eq!(s.voice_duration, 0);
        assert_eq!(s.silence_duration, 60);
    }

    #[test]
    fn short_voice_blip_does_not_reset_silence() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Silence, 10);
        run(&mut d, FrameClass::Voiced, 4); // 80 ms < min_word_length
        assert_eq!(d.state().silence_duration, 200);
        assert!(d.state().in_initial_silence);
    }

    #[test]
    fn first_confirmed_word_starts_greeting() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Silence, 5);
        run(&mut d, FrameClass::Voiced, 5);
        let s = d.state();
        assert_eq!(s.words, 1);
        assert!(!s.in_initial_silence);
        assert!(s.in_greeting);
        assert_eq!(s.silence_duration, 0);
        assert!(d
            .observer()
            .events
            .contains(&DetectorEvent::GreetingStarted { voice_ms: 100 }));
        assert!(d.observer().events.contains(&DetectorEvent::TalkDetected {
            previous_silence_ms: 100
        }));
    }

    #[test]
    fn voice_without_prior_silence_is_not_a_word() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Voiced, 5);
        assert_eq!(d.state().words, 0);
        assert!(d.state().in_greeting);
    }

    #[test]
    fn initial_silence_yields_machine() {
        let mut d = detector(AmdParams::default());
        let outcome = run(&mut d, FrameClass::Silence, 200);
        assert_eq!(
            outcome,
            FrameOutcome::Verdict(Verdict::new(AmdResult::Machine, AmdCause::InitialSilence))
        );
        assert_eq!(d.state().frames, 125);
    }

    #[test]
    fn long_greeting_is_machine() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Voiced, 5); // greeting starts at 100 ms
        let outcome = run(&mut d, FrameClass::Voiced, 100);
        assert_eq!(
            outcome.verdict(),
            Some(Verdict::new(AmdResult::Machine, AmdCause::LongGreeting))
        );
        assert_eq!(d.state().voice_duration, 1_500);
    }

    #[test]
    fn three_words_is_machine() {
        let mut d = detector(AmdParams::default());
        let mut outcome = FrameOutcome::Continue;
        for _ in 0..3 {
            run(&mut d, FrameClass::Silence, 3);
            outcome = run(&mut d, FrameClass::Voiced, 5);
        }
        assert_eq!(
            outcome.verdict(),
            Some(Verdict::new(AmdResult::Machine, AmdCause::MaxWords))
        );
        assert_eq!(d.state().words, 3);
    }

    #[test]
    fn verdict_is_sticky() {
        let mut d = detector(AmdParams::default());
        run(&mut d, FrameClass::Silence, 125);
        let before = d.state();
        let again = d.process_frame(FrameClass::Voiced, 20);
        assert_eq!(
            again.verdict(),
            Some(Verdict::new(AmdResult::Machine, AmdCause::InitialSilence))
        );
        assert_eq!(d.state(), before);
    }

    #[test]
    fn zero_ms_frames_never_advance_durations() {
        let mut d = detector(AmdParams::default());
        for _ in 0..10_000 {
            assert_eq!(d.process_frame(FrameClass::Silence, 0), FrameOutcome::Continue);
        }
        assert_eq!(d.state().silence_duration, 0);
    }

    #[test]
    fn feed_charges_budget_before_classifying() {
        let params = AmdParams {
            total_analysis_time: 100,
            ..AmdParams::default()
        };
        let mut d = detector(params);
        let frame = AudioFrame::constant(0, 20, RATE);
        for _ in 0..4 {
            assert_eq!(d.feed(&frame), FrameOutcome::Continue);
        }
        assert_eq!(d.feed(&frame).verdict(), Some(Verdict::too_long()));
        assert_eq!(d.state().frames, 4);
        assert!(d
            .observer()
            .events
            .contains(&DetectorEvent::BudgetExhausted {
                total_analysis_time: 100
            }));
    }

    #[test]
    fn feed_uses_energy_threshold_from_params() {
        let params = AmdParams {
            silence_threshold: 2_000,
            ..AmdParams::default()
        };
        let mut d = detector(params);
        d.feed(&AudioFrame::constant(1_000, 20, RATE));
        assert_eq!(d.state().silence_duration, 20);
        d.feed(&AudioFrame::constant(3_000, 20, RATE));
        assert_eq!(d.state().voice_duration, 20);
    }
}
