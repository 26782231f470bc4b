//! Verdict types and their channel-variable spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of the answering party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmdResult {
    Human,
    Machine,
    NotSure,
    /// The channel went away before any verdict.
    Cancel,
}

impl AmdResult {
    pub fn as_str(self) -> &'static str {
        match self {
            AmdResult::Human => "HUMAN",
            AmdResult::Machine => "MACHINE",
            AmdResult::NotSure => "NOT_SURE",
            AmdResult::Cancel => "CANCEL",
        }
    }
}

/// Which exit condition produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmdCause {
    InitialSilence,
    SilenceAfterGreeting,
    MaxWordLength,
    MaxWords,
    LongGreeting,
    TooLong,
    Cancel,
}

impl AmdCause {
    pub fn as_str(self) -> &'static str {
        match self {
            AmdCause::InitialSilence => "INITIAL_SILENCE",
            AmdCause::SilenceAfterGreeting => "SILENCE_AFTER_GREETING",
            AmdCause::MaxWordLength => "MAX_WORD_LENGTH",
            AmdCause::MaxWords => "MAX_WORDS",
            AmdCause::LongGreeting => "LONG_GREETING",
            AmdCause::TooLong => "TOO_LONG",
            AmdCause::Cancel => "CANCEL",
        }
    }
}

/// A verdict tag that matched no known value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown AMD tag: {0}")]
pub struct UnknownTag(pub String);

impl FromStr for AmdResult {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AmdResult::Human,
            AmdResult::Machine,
            AmdResult::NotSure,
            AmdResult::Cancel,
        ]
        .into_iter()
        .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

impl FromStr for AmdCause {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AmdCause::InitialSilence,
            AmdCause::SilenceAfterGreeting,
            AmdCause::MaxWordLength,
            AmdCause::MaxWords,
            AmdCause::LongGreeting,
            AmdCause::TooLong,
            AmdCause::Cancel,
        ]
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

impl fmt::Display for AmdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AmdCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of one call's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verdict {
    pub result: AmdResult,
    pub cause: AmdCause,
}

impl Verdict {
    pub const fn new(result: AmdResult, cause: AmdCause) -> Self {
        Self { result, cause }
    }

    /// Fallback when the analysis budget runs out or no condition fired.
    pub const fn too_long() -> Self {
        Self::new(AmdResult::NotSure, AmdCause::TooLong)
    }

    /// The channel hung up before a verdict.
    pub const fn cancel() -> Self {
        Self::new(AmdResult::Cancel, AmdCause::Cancel)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.result, self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!("not_sure".parse::<AmdResult>(), Ok(AmdResult::NotSure));
        assert_eq!("MAX_WORDS".parse::<AmdCause>(), Ok(AmdCause::MaxWords));
        assert!("ROBOT".parse::<AmdResult>().is_err());
    }

    #[test]
    fn verdict_serializes_with_channel_spelling() {
        let v = Verdict::new(AmdResult::Human, AmdCause::SilenceAfterGreeting);
        let json = serde_json::to_value(v).expect("serialize verdict");
        assert_eq!(json["result"], "HUMAN");
        assert_eq!(json["cause"], "SILENCE_AFTER_GREETING");
        assert_eq!(v.to_string(), "HUMAN/SILENCE_AFTER_GREETING");
    }
}
