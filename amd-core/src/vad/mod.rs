//! Frame classification.
//!
//! The `FrameClassifier` trait is the extensibility point: `EnergyClassifier`
//! is the default, tests plug in scripted classifiers, and a smarter VAD can
//! be swapped in without touching the detector.

pub mod energy;

use crate::audio::AudioFrame;

/// Binary label for one audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Mean amplitude at or above the silence threshold.
    Voiced,
    /// Mean amplitude below the silence threshold.
    Silence,
}

impl FrameClass {
    pub fn is_voiced(self) -> bool {
        self == FrameClass::Voiced
    }
}

/// Trait for all frame classifiers.
pub trait FrameClassifier: Send + 'static {
    /// Label a frame as voiced or silent.
    fn classify(&mut self, frame: &AudioFrame) -> FrameClass;
}
