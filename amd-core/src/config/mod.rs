//! Detection parameters.
//!
//! `AmdParams` is the per-call profile. Global defaults live in a
//! `ProfileStore`; every call copies a snapshot at start and then layers its
//! own `key=value` overrides on top (see [`args`]). A profile never changes
//! once its call is running.

pub mod args;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use args::{parse_overrides, parse_truthy, Overrides, ParamKey};

/// Thresholds and durations for one call. Durations are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmdParams {
    /// Maximum silence before any voice is detected.
    pub initial_silence: u32,
    /// Maximum voice duration allowed during the greeting.
    pub greeting: u32,
    /// Silence after the greeting that means a human stopped talking.
    pub after_greeting_silence: u32,
    /// Ceiling on analysed audio. 0 disables the budget.
    pub total_analysis_time: u32,
    /// Voice needed to count a word and to end a silence run.
    #[serde(rename = "min_word_length")]
    pub minimum_word_length: u32,
    /// Silence needed to switch the word phase to IN_SILENCE.
    pub between_words_silence: u32,
    /// Word count that implies a machine greeting.
    pub maximum_number_of_words: u32,
    /// Single continuous voice run that implies a machine.
    pub maximum_word_length: u32,
    /// Mean amplitude score below which a frame is silence.
    pub silence_threshold: u32,
    /// Report NOT_SURE instead of MACHINE when initial silence runs out.
    pub silence_not_sure: bool,
}

impl Default for AmdParams {
    fn default() -> Self {
        Self {
            initial_silence: 2_500,
            greeting: 1_500,
            after_greeting_silence: 800,
            total_analysis_time: 5_000,
            minimum_word_length: 100,
            between_words_silence: 50,
            maximum_number_of_words: 3,
            maximum_word_length: 5_000,
            silence_threshold: 256,
            silence_not_sure: false,
        }
    }
}

impl AmdParams {
    /// Read a numeric parameter through its typed key.
    pub fn get(&self, key: ParamKey) -> Option<u32> {
        match key {
            ParamKey::InitialSilence => Some(self.initial_silence),
            ParamKey::Greeting => Some(self.greeting),
            ParamKey::AfterGreetingSilence => Some(self.after_greeting_silence),
            ParamKey::TotalAnalysisTime => Some(self.total_analysis_time),
            ParamKey::MinWordLength => Some(self.minimum_word_length),
            ParamKey::BetweenWordsSilence => Some(self.between_words_silence),
            ParamKey::MaximumNumberOfWords => Some(self.maximum_number_of_words),
            ParamKey::MaximumWordLength => Some(self.maximum_word_length),
            ParamKey::SilenceThreshold => Some(self.silence_threshold),
            ParamKey::SilenceNotSure => None,
        }
    }

    /// Validate a loaded global profile.
    ///
    /// Zero numeric fields are reset to their defaults. `total_analysis_time`
    /// is exempt because 0 means "no budget".
    pub fn normalize(&mut self) -> Vec<ConfigDiagnostic> {
        let defaults = Self::default();
        let mut diagnostics = Vec::new();
        for key in ParamKey::ALL {
            if key == ParamKey::TotalAnalysisTime {
                continue;
            }
            let (Some(0), Some(default)) = (self.get(key), defaults.get(key)) else {
                continue;
            };
            key.set(self, default);
            diagnostics.push(ConfigDiagnostic::ResetToDefault {
                key: key.name(),
                default,
            });
        }
        diagnostics
    }
}

/// Non-fatal configuration problem. The offending value is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigDiagnostic {
    #[error("unknown parameter [{key}]=[{value}]")]
    UnknownKey { key: String, value: String },

    #[error("invalid [{key}]=[{value}]; value must be a positive integer")]
    InvalidValue { key: String, value: String },

    #[error("ignoring argument [{token}]")]
    MalformedToken { token: String },

    #[error("[{key}] must be positive; using default {default}")]
    ResetToDefault { key: &'static str, default: u32 },
}

/// Shared global defaults.
///
/// Reads hand out a copy, so a `replace` (config reload) only affects calls
/// that start afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    inner: Arc<RwLock<AmdParams>>,
}

impl ProfileStore {
    pub fn new(params: AmdParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Copy of the current defaults.
    pub fn snapshot(&self) -> AmdParams {
        *self.inner.read()
    }

    /// Swap in new defaults for subsequent calls.
    pub fn replace(&self, params: AmdParams) {
        *self.inner.write() = params;
        info!("global AMD defaults replaced");
    }
}
