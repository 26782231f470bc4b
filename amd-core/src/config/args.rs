//! Per-call override arguments.
//!
//! ```text
//! initial_silence=2000 greeting=1200          space separated
//! ^^:initial_silence=2000:silence_not_sure=yes  custom delimiter after "^^"
//! ```
//!
//! Keys are matched case-insensitively. Numeric values must be positive
//! integers; anything else leaves the previous value in place and produces a
//! [`ConfigDiagnostic`].

use super::{AmdParams, ConfigDiagnostic};

const DEFAULT_DELIMITER: char = ' ';
const DELIMITER_PREFIX: &str = "^^";

/// Typed parameter key with one validated setter per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    InitialSilence,
    Greeting,
    AfterGreetingSilence,
    TotalAnalysisTime,
    MinWordLength,
    BetweenWordsSilence,
    MaximumNumberOfWords,
    MaximumWordLength,
    SilenceThreshold,
    SilenceNotSure,
}

impl ParamKey {
    pub const ALL: [ParamKey; 10] = [
        ParamKey::InitialSilence,
        ParamKey::Greeting,
        ParamKey::AfterGreetingSilence,
        ParamKey::TotalAnalysisTime,
        ParamKey::MinWordLength,
        ParamKey::BetweenWordsSilence,
        ParamKey::MaximumNumberOfWords,
        ParamKey::MaximumWordLength,
        ParamKey::SilenceThreshold,
        ParamKey::SilenceNotSure,
    ];

    /// External configuration name.
    pub fn name(self) -> &'static str {
        match self {
            ParamKey::InitialSilence => "initial_silence",
            ParamKey::Greeting => "greeting",
            ParamKey::AfterGreetingSilence => "after_greeting_silence",
            ParamKey::TotalAnalysisTime => "total_analysis_time",
            ParamKey::MinWordLength => "min_word_length",
            ParamKey::BetweenWordsSilence => "between_words_silence",
            ParamKey::MaximumNumberOfWords => "maximum_number_of_words",
            ParamKey::MaximumWordLength => "maximum_word_length",
            ParamKey::SilenceThreshold => "silence_threshold",
            ParamKey::SilenceNotSure => "silence_not_sure",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }

    fn slot(self, params: &mut AmdParams) -> Option<&mut u32> {
        match self {
            ParamKey::InitialSilence => Some(&mut params.initial_silence),
            ParamKey::Greeting => Some(&mut params.greeting),
            ParamKey::AfterGreetingSilence => Some(&mut params.after_greeting_silence),
            ParamKey::TotalAnalysisTime => Some(&mut params.total_analysis_time),
            ParamKey::MinWordLength => Some(&mut params.minimum_word_length),
            ParamKey::BetweenWordsSilence => Some(&mut params.between_words_silence),
            ParamKey::MaximumNumberOfWords => Some(&mut params.maximum_number_of_words),
            ParamKey::MaximumWordLength => Some(&mut params.maximum_word_length),
            ParamKey::SilenceThreshold => Some(&mut params.silence_threshold),
            ParamKey::SilenceNotSure => None,
        }
    }

    /// Store a numeric value without validation. No-op for the boolean key.
    pub(crate) fn set(self, params: &mut AmdParams, value: u32) {
        if let Some(slot) = self.slot(params) {
            *slot = value;
        }
    }

    /// Validate `raw` and store it. Returns `false` (and leaves `params`
    /// untouched) when the value is rejected.
    pub fn apply(self, params: &mut AmdParams, raw: &str) -> bool {
        if self == ParamKey::SilenceNotSure {
            params.silence_not_sure = parse_truthy(raw);
            return true;
        }
        match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => {
                self.set(params, value);
                true
            }
            _ => false,
        }
    }
}

/// Permissive boolean parse: `yes`, `on`, `true`, `t`, `enabled`, `active`,
/// `allow`, or a non-zero leading integer (`"5abc"` is true).
pub fn parse_truthy(raw: &str) -> bool {
    let value = raw.trim();
    if ["yes", "on", "true", "t", "enabled", "active", "allow"]
        .iter()
        .any(|word| value.eq_ignore_ascii_case(word))
    {
        return true;
    }
    has_nonzero_leading_int(value)
}

/// Whether `value` starts with an optionally signed integer other than 0.
fn has_nonzero_leading_int(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    digits
        .chars()
        .take_while(char::is_ascii_digit)
        .any(|c| c != '0')
}

/// Result of layering an argument string over a base profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub params: AmdParams,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

/// Apply `args` on top of `base`.
pub fn parse_overrides(base: &AmdParams, args: &str) -> Overrides {
    let mut params = *base;
    let mut diagnostics = Vec::new();
    let (delimiter, body) = split_delimiter(args);

    for token in body.split(delimiter).filter(|t| !t.trim().is_empty()) {
        let Some((key, value)) = token.split_once('=') else {
            diagnostics.push(ConfigDiagnostic::MalformedToken {
                token: token.to_string(),
            });
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match ParamKey::from_name(key) {
            Some(param) if param.apply(&mut params, value) => {}
            Some(_) => diagnostics.push(ConfigDiagnostic::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
            None => diagnostics.push(ConfigDiagnostic::UnknownKey {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    Overrides {
        params,
        diagnostics,
    }
}

fn split_delimiter(args: &str) -> (char, &str) {
    let Some(rest) = args.strip_prefix(DELIMITER_PREFIX) else {
        return (DEFAULT_DELIMITER, args);
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(delimiter) => (delimiter, chars.as_str()),
        None => (DEFAULT_DELIMITER, ""),
    }
}
