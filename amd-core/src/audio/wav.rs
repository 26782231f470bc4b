//! WAV file frame source.
//!
//! Decodes the whole file up front, downmixes to mono 16-bit and then hands
//! out fixed-length frames, the last one possibly short.

use std::path::Path;

use tracing::debug;

use super::{AudioFrame, FrameSource};
use crate::error::{AmdError, Result};

/// Frame source backed by a decoded WAV recording.
#[derive(Debug, Clone)]
pub struct WavFrameSource {
    samples: Vec<i16>,
    sample_rate: u32,
    frame_samples: usize,
    position: usize,
}

impl WavFrameSource {
    /// Open `path` and slice it into frames of `frame_ms` milliseconds.
    ///
    /// # Errors
    /// - `AmdError::Wav` if the file is missing or not a valid WAV.
    /// - `AmdError::InvalidSampleRate` if the header reports 0 Hz.
    pub fn open(path: &Path, frame_ms: u32) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(AmdError::InvalidSampleRate(0));
        }
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
                let shift = 16 - u32::from(spec.bits_per_sample);
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v << shift))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let shift = u32::from(spec.bits_per_sample) - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect()
        };

        debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels,
            samples = samples.len(),
            "wav decoded"
        );

        Ok(Self::from_samples(samples, spec.sample_rate, frame_ms))
    }

    /// Build a source from mono samples already in memory.
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32, frame_ms: u32) -> Self {
        let frame_samples = (u64::from(sample_rate) * u64::from(frame_ms) / 1000).max(1) as usize;
        Self {
            samples,
            sample_rate,
            frame_samples,
            position: 0,
        }
    }

    /// Total recording length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

impl FrameSource for WavFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + self.frame_samples).min(self.samples.len());
        let frame = AudioFrame::new(self.samples[self.position..end].to_vec(), self.sample_rate);
        self.position = end;
        Ok(Some(frame))
    }
}
