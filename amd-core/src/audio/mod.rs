//! Audio frames and the pull-based sources that deliver them.
//!
//! A frame is one block of 16-bit PCM as delivered by the telephony host.
//! Frame sizes may vary from read to read, so the duration is recomputed for
//! every frame rather than fixed at call start.

pub mod wav;

use std::collections::VecDeque;

pub use wav::WavFrameSource;

use crate::error::Result;

/// A contiguous block of 16-bit PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Signed 16-bit samples, first channel of the stream.
    pub samples: Vec<i16>,
    /// Stream sample rate in Hz (e.g. 8000, 16000, 48000).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A frame of `duration_ms` filled with a constant sample value.
    pub fn constant(value: i16, duration_ms: u32, sample_rate: u32) -> Self {
        let len = (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize;
        Self::new(vec![value; len], sample_rate)
    }

    /// Number of samples in this frame.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Frame duration in whole milliseconds. See [`frame_duration_ms`].
    pub fn duration_ms(&self) -> u32 {
        frame_duration_ms(self.sample_rate, self.samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Duration of a frame as `1000 / (rate / samples)` with truncating integer
/// division.
///
/// Small frames at high sample rates truncate to 0 ms and therefore never
/// advance the duration counters. Frames longer than one second (where
/// `rate / samples` is 0) fall back to `samples * 1000 / rate`.
pub fn frame_duration_ms(sample_rate: u32, sample_count: usize) -> u32 {
    if sample_rate == 0 || sample_count == 0 {
        return 0;
    }
    let rate = u64::from(sample_rate);
    let samples = sample_count as u64;
    let frames_per_second = rate / samples;
    let ms = if frames_per_second == 0 {
        samples * 1000 / rate
    } else {
        1000 / frames_per_second
    };
    u32::try_from(ms).unwrap_or(u32::MAX)
}

/// Pull-based audio delivery, one frame per read, in temporal order.
pub trait FrameSource {
    /// Sample rate of every frame this source yields.
    fn sample_rate(&self) -> u32;

    /// Read the next frame.
    ///
    /// `Ok(None)` means the stream ended. An `Err` is a stream break: the
    /// caller stops reading and finalizes without forcing a verdict.
    fn read_frame(&mut self) -> Result<Option<AudioFrame>>;
}

/// Frame source over pre-built frames. Used by tests and the benchmark.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    sample_rate: u32,
    frames: VecDeque<AudioFrame>,
}

impl MemoryFrameSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: VecDeque::new(),
        }
    }

    /// Append `count` frames of `frame_ms` each, all at amplitude `value`.
    pub fn push_run(&mut self, value: i16, frame_ms: u32, count: usize) -> &mut Self {
        for _ in 0..count {
            self.frames
                .push_back(AudioFrame::constant(value, frame_ms, self.sample_rate));
        }
        self
    }

    pub fn push(&mut self, frame: AudioFrame) -> &mut Self {
        self.frames.push_back(frame);
        self
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemoryFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        Ok(self.frames.pop_front())
    }
}
