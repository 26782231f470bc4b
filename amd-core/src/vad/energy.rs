//! Energy-based frame classifier.
//!
//! ## Algorithm
//!
//! 1. Sum `|sample|` over the frame.
//! 2. Divide by the sample count, truncating to an integer score.
//! 3. Score ≥ `threshold` → `Voiced`, otherwise `Silence`.
//!
//! This is a coarse heuristic, not real VAD. Misclassified frames are
//! absorbed by the detector's duration thresholds.

use super::{FrameClass, FrameClassifier};
use crate::audio::AudioFrame;

/// Mean-absolute-amplitude classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyClassifier {
    /// Score at or above which a frame counts as voiced.
    threshold: u32,
}

impl EnergyClassifier {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Mean absolute sample amplitude, integer-truncated. Empty frames score 0.
    pub fn score(samples: &[i16]) -> u32 {
        if samples.is_empty() {
            return 0;
        }
        let energy: u64 = samples
            .iter()
            .map(|&s| u64::from(s.unsigned_abs()))
            .sum();
        (energy / samples.len() as u64) as u32
    }
}

/// Pure classification of a sample block against `threshold`.
pub fn classify(samples: &[i16], threshold: u32) -> FrameClass {
    if EnergyClassifier::score(samples) >= threshold {
        FrameClass::Voiced
    } else {
        FrameClass::Silence
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &AudioFrame) -> FrameClass {
        classify(&frame.samples, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyClassifier::new(256);
        let frame = AudioFrame::new(vec![0; 160], 8_000);
        assert_eq!(vad.classify(&frame), FrameClass::Silence);
    }

    #[test]
    fn voiced_above_threshold() {
        let mut vad = EnergyClassifier::new(256);
        let frame = AudioFrame::new(vec![1_000; 160], 8_000);
        assert_eq!(vad.classify(&frame), FrameClass::Voiced);
    }

    #[test]
    fn score_equal_to_threshold_is_voiced() {
        assert_eq!(classify(&[256, -256, 256, -256], 256), FrameClass::Voiced);
        assert_eq!(classify(&[255, -255, 255, -255], 256), FrameClass::Silence);
    }

    #[test]
    fn score_uses_absolute_values_and_truncates() {
        // (100 + 200 + 300) / 4 = 150
        assert_eq!(EnergyClassifier::score(&[100, -200, 300, 0]), 150);
        // 7 / 2 = 3.5 → 3
        assert_eq!(EnergyClassifier::score(&[3, -4]), 3);
    }

    #[test]
    fn i16_min_does_not_overflow() {
        assert_eq!(EnergyClassifier::score(&[i16::MIN, i16::MIN]), 32_768);
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut vad = EnergyClassifier::default();
        assert_eq!(vad.classify(&AudioFrame::new(vec![], 8_000)), FrameClass::Silence);
    }
}
