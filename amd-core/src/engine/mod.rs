//! `AmdEngine`: runs calls against the shared default profile.
//!
//! ## Threading
//!
//! Every call gets its own `AmdSession` on a `spawn_blocking` thread. The
//! only shared state is the `ProfileStore` (read once per call), the event
//! broadcast sender and the atomic diagnostics counters.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, info_span};

use crate::{
    audio::FrameSource,
    config::{AmdParams, ProfileStore},
    detector::{AmdResult, Verdict},
    error::Result,
    events::AmdEvent,
    session::{AmdSession, CallChannel, HookCommand},
};

/// Broadcast channel capacity: verdict events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

#[derive(Default)]
pub struct EngineDiagnostics {
    pub calls_started: AtomicUsize,
    pub calls_rejected: AtomicUsize,
    pub frames_in: AtomicUsize,
    pub voiced_frames: AtomicUsize,
    pub verdicts_human: AtomicUsize,
    pub verdicts_machine: AtomicUsize,
    pub verdicts_not_sure: AtomicUsize,
    pub verdicts_cancel: AtomicUsize,
}

impl EngineDiagnostics {
    pub fn reset(&self) {
        self.calls_started.store(0, Ordering::Relaxed);
        self.calls_rejected.store(0, Ordering::Relaxed);
        self.frames_in.store(0, Ordering::Relaxed);
        self.voiced_frames.store(0, Ordering::Relaxed);
        self.verdicts_human.store(0, Ordering::Relaxed);
        self.verdicts_machine.store(0, Ordering::Relaxed);
        self.verdicts_not_sure.store(0, Ordering::Relaxed);
        self.verdicts_cancel.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            calls_started: self.calls_started.load(Ordering::Relaxed),
            calls_rejected: self.calls_rejected.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            voiced_frames: self.voiced_frames.load(Ordering::Relaxed),
            verdicts_human: self.verdicts_human.load(Ordering::Relaxed),
            verdicts_machine: self.verdicts_machine.load(Ordering::Relaxed),
            verdicts_not_sure: self.verdicts_not_sure.load(Ordering::Relaxed),
            verdicts_cancel: self.verdicts_cancel.load(Ordering::Relaxed),
        }
    }

    fn record_verdict(&self, result: AmdResult) {
        let counter = match result {
            AmdResult::Human => &self.verdicts_human,
            AmdResult::Machine => &self.verdicts_machine,
            AmdResult::NotSure => &self.verdicts_not_sure,
            AmdResult::Cancel => &self.verdicts_cancel,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub calls_started: usize,
    pub calls_rejected: usize,
    pub frames_in: usize,
    pub voiced_frames: usize,
    pub verdicts_human: usize,
    pub verdicts_machine: usize,
    pub verdicts_not_sure: usize,
    pub verdicts_cancel: usize,
}

/// Summary of one finished call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub channel: String,
    pub verdict: Verdict,
    /// Frames that reached the state machine.
    pub frames: u64,
    pub voiced_frames: u64,
    /// Audio time analysed before the verdict.
    pub audio_ms: u64,
    pub hook: Option<HookCommand>,
    /// Rendered override diagnostics.
    pub diagnostics: Vec<String>,
}

/// Everything one call needs, cloned into its worker thread.
#[derive(Clone)]
struct CallContext {
    profiles: ProfileStore,
    event_tx: broadcast::Sender<AmdEvent>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl CallContext {
    fn run<C, S>(&self, channel: C, source: &mut S, args: &str) -> Result<CallReport>
    where
        C: CallChannel,
        S: FrameSource + ?Sized,
    {
        let span = info_span!("amd_call", channel = channel.name());
        let _entered = span.enter();

        let params = self.profiles.snapshot();
        self.diagnostics.calls_started.fetch_add(1, Ordering::Relaxed);

        let mut session = match AmdSession::start(channel, &params, args, source.sample_rate()) {
            Ok(session) => session,
            Err(e) => {
                self.diagnostics.calls_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        session.run(source);
        let diagnostics = session
            .diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect();
        let outcome = session.finish();

        self.diagnostics
            .frames_in
            .fetch_add(outcome.frames as usize, Ordering::Relaxed);
        self.diagnostics
            .voiced_frames
            .fetch_add(outcome.voiced_frames as usize, Ordering::Relaxed);
        self.diagnostics.record_verdict(outcome.verdict.result);

        if let Some(event) = &outcome.event {
            // No subscribers is fine.
            let _ = self.event_tx.send(event.clone());
        }

        info!(
            verdict = %outcome.verdict,
            frames = outcome.frames,
            audio_ms = outcome.audio_ms,
            "call analysis closed"
        );

        Ok(CallReport {
            channel: outcome.channel.name().to_string(),
            verdict: outcome.verdict,
            frames: outcome.frames,
            voiced_frames: outcome.voiced_frames,
            audio_ms: outcome.audio_ms,
            hook: outcome.hook,
            diagnostics,
        })
    }
}

/// The top-level engine handle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AmdEngine {
    ctx: CallContext,
}

impl AmdEngine {
    pub fn new(defaults: AmdParams) -> Self {
        Self::with_store(ProfileStore::new(defaults))
    }

    pub fn with_store(profiles: ProfileStore) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            ctx: CallContext {
                profiles,
                event_tx,
                diagnostics: Arc::new(EngineDiagnostics::default()),
            },
        }
    }

    /// Global defaults. Replacing them affects only calls started later.
    pub fn profiles(&self) -> &ProfileStore {
        &self.ctx.profiles
    }

    /// Analyse one call on the current thread.
    ///
    /// # Errors
    /// - `AmdError::MediaUnavailable` if the channel has no media.
    /// - `AmdError::InvalidSampleRate` if the source reports 0 Hz.
    pub fn analyze<C, S>(&self, channel: C, source: &mut S, args: &str) -> Result<CallReport>
    where
        C: CallChannel,
        S: FrameSource + ?Sized,
    {
        self.ctx.run(channel, source, args)
    }

    /// Analyse one call on a blocking worker thread.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_call<C, S>(
        &self,
        channel: C,
        mut source: S,
        args: impl Into<String>,
    ) -> JoinHandle<Result<CallReport>>
    where
        C: CallChannel + 'static,
        S: FrameSource + Send + 'static,
    {
        let ctx = self.ctx.clone();
        let args = args.into();
        tokio::task::spawn_blocking(move || ctx.run(channel, &mut source, &args))
    }

    /// Subscribe to verdict events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AmdEvent> {
        self.ctx.event_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.ctx.diagnostics.snapshot()
    }

    pub fn reset_diagnostics(&self) {
        self.ctx.diagnostics.reset();
    }
}

impl std::fmt::Debug for AmdEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmdEngine")
            .field("defaults", &self.ctx.profiles.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryFrameSource;
    use crate::error::AmdError;
    use crate::session::MemoryChannel;

    #[test]
    fn analyze_counts_frames_and_verdicts() {
        let engine = AmdEngine::new(AmdParams::default());
        let mut source = MemoryFrameSource::new(8_000);
        source.push_run(0, 20, 200);

        let report = engine
            .analyze(MemoryChannel::new("count"), &mut source, "")
            .expect("analyze");
        assert_eq!(report.frames, 125);
        assert_eq!(report.audio_ms, 2_500);

        let snap = engine.diagnostics_snapshot();
        assert_eq!(snap.calls_started, 1);
        assert_eq!(snap.frames_in, 125);
        assert_eq!(snap.verdicts_machine, 1);

        engine.reset_diagnostics();
        assert_eq!(engine.diagnostics_snapshot().calls_started, 0);
    }

    #[test]
    fn rejected_call_is_counted() {
        let engine = AmdEngine::new(AmdParams::default());
        let mut channel = MemoryChannel::new("no-media");
        channel.media_up = false;
        let err = engine
            .analyze(channel, &mut MemoryFrameSource::new(8_000), "")
            .unwrap_err();
        assert!(matches!(err, AmdError::MediaUnavailable));
        assert_eq!(engine.diagnostics_snapshot().calls_rejected, 1);
    }

    #[test]
    fn report_carries_rendered_diagnostics() {
        let engine = AmdEngine::new(AmdParams::default());
        let report = engine
            .analyze(
                MemoryChannel::new("diag"),
                &mut MemoryFrameSource::new(8_000),
                "greeting=-1",
            )
            .expect("analyze");
        assert_eq!(
            report.diagnostics,
            vec!["invalid [greeting]=[-1]; value must be a positive integer".to_string()]
        );
    }
}
