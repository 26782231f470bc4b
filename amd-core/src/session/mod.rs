//! Host integration: one analysed call.
//!
//! ## Lifecycle
//!
//! ```text
//! AmdSession::start()     media check, overrides parsed, detector built
//!     └─► run(source)     frames pulled until verdict / end / read error
//!         └─► finish()    defaults applied, event fired, hook executed
//! ```
//!
//! The telephony host is reached only through `CallChannel`; audio arrives
//! through `FrameSource`.

pub mod hooks;

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

pub use hooks::{hook_variable, HookCommand, HOOK_ON_HUMAN, HOOK_ON_MACHINE, HOOK_ON_NOT_SURE};

use crate::audio::{AudioFrame, FrameSource};
use crate::config::{parse_overrides, AmdParams, ConfigDiagnostic};
use crate::detector::{
    AmdCause, AmdResult, Detector, DetectorObserver, FrameOutcome, TracingObserver, Verdict,
};
use crate::error::{AmdError, Result};
use crate::events::AmdEvent;
use crate::vad::FrameClassifier;

/// Channel variable holding the verdict result.
pub const VAR_RESULT: &str = "amd_result";
/// Channel variable holding the verdict cause.
pub const VAR_CAUSE: &str = "amd_cause";

/// What the core needs from the host's call/channel abstraction.
pub trait CallChannel: Send {
    /// Display name used in logs and events.
    fn name(&self) -> &str;

    /// `false` once the call has hung up.
    fn is_ready(&self) -> bool;

    /// Whether a media stream is attached and readable.
    fn media_up(&self) -> bool;

    fn variable(&self, name: &str) -> Option<String>;

    fn set_variable(&mut self, name: &str, value: &str);

    /// All channel variables, attached to the verdict event.
    fn variables(&self) -> BTreeMap<String, String>;

    /// Substitute `${name}` references.
    fn expand_variables(&self, input: &str) -> String {
        expand_variables(input, |name| self.variable(name))
    }

    fn fire_event(&mut self, event: &AmdEvent);

    /// Run a hook application, in the background when `command.background`.
    fn execute(&mut self, command: &HookCommand);
}

/// Replace every `${name}` in `input` with `lookup(name)`, or nothing when
/// the variable is unset. An unterminated `${` is copied verbatim.
pub fn expand_variables(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        if let Some(value) = lookup(&after[..end]) {
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// In-memory channel. Records fired events and executed hooks.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    pub name: String,
    pub ready: bool,
    pub media_up: bool,
    pub vars: BTreeMap<String, String>,
    pub events: Vec<AmdEvent>,
    pub executed: Vec<HookCommand>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            media_up: true,
            vars: BTreeMap::new(),
            events: Vec::new(),
            executed: Vec::new(),
        }
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl CallChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn media_up(&self) -> bool {
        self.media_up
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn variables(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }

    fn fire_event(&mut self, event: &AmdEvent) {
        self.events.push(event.clone());
    }

    fn execute(&mut self, command: &HookCommand) {
        self.executed.push(command.clone());
    }
}

/// Final state of a call once analysis has closed.
#[derive(Debug)]
pub struct SessionOutcome<C> {
    pub verdict: Verdict,
    /// Fired only when the channel was still up.
    pub event: Option<AmdEvent>,
    /// Hook that was executed, if any.
    pub hook: Option<HookCommand>,
    /// Frames that reached the state machine.
    pub frames: u64,
    pub voiced_frames: u64,
    pub audio_ms: u64,
    pub channel: C,
}

/// One call under analysis.
pub struct AmdSession<C: CallChannel, O: DetectorObserver = TracingObserver> {
    channel: C,
    detector: Detector<O>,
    diagnostics: Vec<ConfigDiagnostic>,
}

impl<C: CallChannel> AmdSession<C> {
    /// Begin analysis on `channel` with `defaults` overridden by `args`.
    ///
    /// # Errors
    /// - `AmdError::MediaUnavailable` if the channel has no media.
    /// - `AmdError::InvalidSampleRate` if `sample_rate` is 0.
    pub fn start(channel: C, defaults: &AmdParams, args: &str, sample_rate: u32) -> Result<Self> {
        Self::start_with_observer(channel, defaults, args, sample_rate, TracingObserver::default())
    }
}

impl<C: CallChannel, O: DetectorObserver> AmdSession<C, O> {
    pub fn start_with_observer(
        channel: C,
        defaults: &AmdParams,
        args: &str,
        sample_rate: u32,
        observer: O,
    ) -> Result<Self> {
        if !channel.media_up() {
            error!(
                channel = channel.name(),
                "can not analyze session, media not enabled on channel"
            );
            return Err(AmdError::MediaUnavailable);
        }

        let overrides = parse_overrides(defaults, args);
        for diagnostic in &overrides.diagnostics {
            warn!(channel = channel.name(), "AMD: {diagnostic}");
        }

        let detector = Detector::with_observer(overrides.params, sample_rate, observer)?;
        debug!(channel = channel.name(), params = ?overrides.params, "AMD analysis started");

        Ok(Self {
            channel,
            detector,
            diagnostics: overrides.diagnostics,
        })
    }

    /// Replace the default energy classifier.
    pub fn with_classifier(mut self, classifier: impl FrameClassifier) -> Self {
        self.detector = self.detector.with_classifier(classifier);
        self
    }

    /// Analyse one frame. The first verdict is written to the channel.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> FrameOutcome {
        if let Some(verdict) = self.detector.verdict() {
            return FrameOutcome::Verdict(verdict);
        }

        let outcome = self.detector.feed(frame);
        if let FrameOutcome::Verdict(verdict) = outcome {
            info!(channel = self.channel.name(), %verdict, "AMD verdict");
            write_verdict(&mut self.channel, verdict);
        }
        outcome
    }

    /// Pull frames until a verdict, the end of the stream, a read error or
    /// hang-up.
    pub fn run<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Option<Verdict> {
        loop {
            if !self.channel.is_ready() {
                debug!(channel = self.channel.name(), "channel gone, stopping analysis");
                return None;
            }
            match source.read_frame() {
                Ok(Some(frame)) => {
                    if let FrameOutcome::Verdict(verdict) = self.push_frame(&frame) {
                        return Some(verdict);
                    }
                }
                Ok(None) => {
                    debug!(channel = self.channel.name(), "audio stream ended");
                    return None;
                }
                Err(e) => {
                    warn!(channel = self.channel.name(), "audio read failed, stopping analysis: {e}");
                    return None;
                }
            }
        }
    }

    /// Close the analysis and resolve it to exactly one verdict.
    ///
    /// With the channel up, a missing verdict becomes NOT_SURE/TOO_LONG, the
    /// verdict event fires and the matching hook runs. With the channel gone,
    /// a missing verdict becomes CANCEL/CANCEL and nothing else happens.
    pub fn finish(self) -> SessionOutcome<C> {
        let state = self.detector.state();
        let mut channel = self.channel;

        if !channel.is_ready() {
            let verdict = read_verdict(&channel).unwrap_or_else(|| {
                debug!(
                    channel = channel.name(),
                    "variable amd_result not defined. set amd_result=CANCEL"
                );
                let verdict = Verdict::cancel();
                write_verdict(&mut channel, verdict);
                verdict
            });
            return SessionOutcome {
                verdict,
                event: None,
                hook: None,
                frames: state.frames,
                voiced_frames: state.voiced_frames,
                audio_ms: state.elapsed_ms,
                channel,
            };
        }

        let verdict = read_verdict(&channel).unwrap_or_else(|| {
            warn!(
                channel = channel.name(),
                "variable amd_result not defined. set amd_result=NOT_SURE"
            );
            let verdict = Verdict::too_long();
            write_verdict(&mut channel, verdict);
            verdict
        });

        let event = AmdEvent::new(channel.name(), verdict, channel.variables());
        channel.fire_event(&event);
        let hook = hooks::dispatch(&mut channel, verdict.result);

        SessionOutcome {
            verdict,
            event: Some(event),
            hook,
            frames: state.frames,
            voiced_frames: state.voiced_frames,
            audio_ms: state.elapsed_ms,
            channel,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn detector(&self) -> &Detector<O> {
        &self.detector
    }

    /// Problems found in the override arguments.
    pub fn diagnostics(&self) -> &[ConfigDiagnostic] {
        &self.diagnostics
    }

    /// Audio time that went through the state machine.
    pub fn audio_ms(&self) -> u64 {
        self.detector.state().elapsed_ms
    }
}

fn write_verdict<C: CallChannel + ?Sized>(channel: &mut C, verdict: Verdict) {
    channel.set_variable(VAR_RESULT, verdict.result.as_str());
    channel.set_variable(VAR_CAUSE, verdict.cause.as_str());
}

/// Verdict already stored on the channel. An unrecognised `amd_result`
/// counts as unset; a missing cause is filled from the result.
fn read_verdict<C: CallChannel + ?Sized>(channel: &C) -> Option<Verdict> {
    let raw = channel.variable(VAR_RESULT)?;
    let result = match raw.parse::<AmdResult>() {
        Ok(result) => result,
        Err(e) => {
            warn!(channel = channel.name(), "ignoring {VAR_RESULT}: {e}");
            return None;
        }
    };
    let cause = channel
        .variable(VAR_CAUSE)
        .and_then(|c| c.parse::<AmdCause>().ok())
        .unwrap_or(match result {
            AmdResult::Cancel => AmdCause::Cancel,
            _ => AmdCause::TooLong,
        });
    Some(Verdict::new(result, cause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryFrameSource;

    const RATE: u32 = 8_000;

    #[test]
    fn expands_known_and_unknown_variables() {
        let lookup = |name: &str| (name == "dest").then(|| "1000".to_string());
        assert_eq!(
            expand_variables("transfer ${dest} XML ${ctx}", lookup),
            "transfer 1000 XML "
        );
        assert_eq!(expand_variables("broken ${dest", lookup), "broken ${dest");
    }

    #[test]
    fn refuses_channel_without_media() {
        let mut channel = MemoryChannel::new("no-media");
        channel.media_up = false;
        let err = AmdSession::start(channel, &AmdParams::default(), "", RATE)
            .err()
            .expect("start should fail");
        assert!(matches!(err, AmdError::MediaUnavailable));
    }

    #[test]
    fn keeps_override_diagnostics() {
        let session = AmdSession::start(
            MemoryChannel::new("diag"),
            &AmdParams::default(),
            "greeting=abc volume=3",
            RATE,
        )
        .expect("start");
        assert_eq!(session.diagnostics().len(), 2);
        assert_eq!(session.detector().params().greeting, 1_500);
    }

    #[test]
    fn verdict_is_written_and_hook_executed() {
        let channel = MemoryChannel::new("machine").with_variable(HOOK_ON_MACHINE, "hangup");
        let mut session =
            AmdSession::start(channel, &AmdParams::default(), "", RATE).expect("start");
        let mut source = MemoryFrameSource::new(RATE);
        source.push_run(0, 20, 200);

        let verdict = session.run(&mut source);
        assert_eq!(
            verdict,
            Some(Verdict::new(AmdResult::Machine, AmdCause::InitialSilence))
        );
        assert_eq!(session.audio_ms(), 2_500);

        let outcome = session.finish();
        assert_eq!(outcome.channel.vars[VAR_RESULT], "MACHINE");
        assert_eq!(outcome.channel.vars[VAR_CAUSE], "INITIAL_SILENCE");
        assert_eq!(outcome.channel.events.len(), 1);
        assert_eq!(outcome.channel.executed.len(), 1);
        assert_eq!(outcome.channel.executed[0].application, "hangup");
        assert_eq!(outcome.frames, 125);
    }

    #[test]
    fn stream_end_without_verdict_defaults_to_too_long() {
        let channel = MemoryChannel::new("short").with_variable(HOOK_ON_NOT_SURE, "park");
        let mut session =
            AmdSession::start(channel, &AmdParams::default(), "", RATE).expect("start");
        let mut source = MemoryFrameSource::new(RATE);
        source.push_run(0, 20, 10);

        assert_eq!(session.run(&mut source), None);
        let outcome = session.finish();
        assert_eq!(outcome.verdict, Verdict::too_long());
        assert_eq!(outcome.channel.vars[VAR_CAUSE], "TOO_LONG");
        assert!(outcome.event.is_some());
        assert_eq!(outcome.hook.map(|h| h.application).as_deref(), Some("park"));
    }

    #[test]
    fn hangup_without_verdict_is_cancel_with_no_event_or_hook() {
        let channel = MemoryChannel::new("gone").with_variable(HOOK_ON_NOT_SURE, "park");
        let mut session =
            AmdSession::start(channel, &AmdParams::default(), "", RATE).expect("start");
        session.push_frame(&AudioFrame::constant(0, 20, RATE));
        session.channel_mut().ready = false;

        let outcome = session.finish();
        assert_eq!(outcome.verdict, Verdict::cancel());
        assert_eq!(outcome.channel.vars[VAR_RESULT], "CANCEL");
        assert!(outcome.event.is_none());
        assert!(outcome.channel.events.is_empty());
        assert!(outcome.channel.executed.is_empty());
    }

    #[test]
    fn hangup_after_verdict_keeps_verdict() {
        let mut session = AmdSession::start(
            MemoryChannel::new("late-hangup"),
            &AmdParams::default(),
            "",
            RATE,
        )
        .expect("start");
        let mut source = MemoryFrameSource::new(RATE);
        source.push_run(0, 20, 125);
        session.run(&mut source);
        session.channel_mut().ready = false;

        let outcome = session.finish();
        assert_eq!(outcome.verdict.cause, AmdCause::InitialSilence);
        assert!(outcome.event.is_none());
    }

    #[test]
    fn hook_arguments_are_variable_expanded() {
        let channel = MemoryChannel::new("expand")
            .with_variable("agent", "2000")
            .with_variable(HOOK_ON_HUMAN, "transfer ${agent} XML default");
        let mut session =
            AmdSession::start(channel, &AmdParams::default(), "", RATE).expect("start");
        session.push_frame(&AudioFrame::constant(5_000, 100, RATE));
        session.channel_mut().set_variable(VAR_RESULT, "HUMAN");
        session
            .channel_mut()
            .set_variable(VAR_CAUSE, "SILENCE_AFTER_GREETING");

        let outcome = session.finish();
        let hook = outcome.hook.expect("human hook executed");
        assert_eq!(hook.application, "transfer");
        assert_eq!(hook.argument.as_deref(), Some("2000 XML default"));
    }

    #[test]
    fn unrecognised_result_variable_is_replaced() {
        let mut session = AmdSession::start(
            MemoryChannel::new("garbage"),
            &AmdParams::default(),
            "",
            RATE,
        )
        .expect("start");
        session.channel_mut().set_variable(VAR_RESULT, "ROBOT");
        let outcome = session.finish();
        assert_eq!(outcome.verdict, Verdict::too_long());
        assert_eq!(outcome.channel.vars[VAR_RESULT], "NOT_SURE");
    }

    #[test]
    fn frames_after_verdict_do_not_rewrite_channel() {
        let mut session = AmdSession::start(
            MemoryChannel::new("sticky"),
            &AmdParams::default(),
            "initial_silence=100",
            RATE,
        )
        .expect("start");
        for _ in 0..5 {
            session.push_frame(&AudioFrame::constant(0, 20, RATE));
        }
        session.channel_mut().set_variable(VAR_CAUSE, "CHANGED");
        session.push_frame(&AudioFrame::constant(0, 20, RATE));
        assert_eq!(session.channel().vars[VAR_CAUSE], "CHANGED");
    }
}
