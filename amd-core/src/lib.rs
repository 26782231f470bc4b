//! # amd-core
//!
//! Real-time answering-machine detection (AMD) SDK.
//!
//! ## Architecture
//!
//! ```text
//! FrameSource::read_frame → AnalysisBudget check → EnergyClassifier
//!                                                        │
//!                                                 VOICED | SILENCE
//!                                                        │
//!                                           Detector::process_frame
//!                                                        │
//!                                      Continue  |  Verdict { result, cause }
//!                                                        │
//!                          AmdSession::finish → amd_result / amd_cause, event, hook
//! ```
//!
//! Each call owns one `Detector`. Nothing is shared between calls except a
//! read-only snapshot of the global defaults taken from `ProfileStore`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod events;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{AudioFrame, FrameSource, MemoryFrameSource, WavFrameSource};
pub use config::{parse_overrides, AmdParams, ConfigDiagnostic, Overrides, ProfileStore};
pub use detector::{
    AmdCause, AmdResult, Detector, DetectorState, FrameOutcome, Verdict, WordPhase,
};
pub use engine::{AmdEngine, CallReport};
pub use error::AmdError;
pub use events::AmdEvent;
pub use session::{AmdSession, CallChannel, HookCommand, MemoryChannel};
pub use vad::{energy::EnergyClassifier, FrameClass, FrameClassifier};
