//! Notification published once per call when analysis closes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::{AmdCause, AmdResult, Verdict};

/// Event subclass name seen by event consumers.
pub const AMD_EVENT_NAME: &str = "mod_amd::info";

/// Verdict notification carrying the channel context at verdict time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmdEvent {
    /// Always [`AMD_EVENT_NAME`].
    pub name: String,
    /// Channel that was analysed.
    pub channel: String,
    pub result: AmdResult,
    pub cause: AmdCause,
    /// Channel variables, including `amd_result` and `amd_cause`.
    pub variables: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AmdEvent {
    pub fn new(channel: &str, verdict: Verdict, variables: BTreeMap<String, String>) -> Self {
        Self {
            name: AMD_EVENT_NAME.to_string(),
            channel: channel.to_string(),
            result: verdict.result,
            cause: verdict.cause,
            variables,
            timestamp: Utc::now(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::new(self.result, self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_camel_case_and_channel_tags() {
        let mut vars = BTreeMap::new();
        vars.insert("amd_result".to_string(), "MACHINE".to_string());
        let event = AmdEvent::new(
            "sofia/external/1000",
            Verdict::new(AmdResult::Machine, AmdCause::MaxWords),
            vars,
        );

        let json = serde_json::to_value(&event).expect("serialize amd event");
        assert_eq!(json["name"], "mod_amd::info");
        assert_eq!(json["channel"], "sofia/external/1000");
        assert_eq!(json["result"], "MACHINE");
        assert_eq!(json["cause"], "MAX_WORDS");
        assert_eq!(json["variables"]["amd_result"], "MACHINE");
        assert!(json["timestamp"].is_string());

        let round_trip: AmdEvent = serde_json::from_value(json).expect("deserialize amd event");
        assert_eq!(round_trip.verdict(), event.verdict());
    }

    #[test]
    fn result_rejects_non_channel_spelling() {
        let err = serde_json::from_str::<AmdResult>(r#""NotSure""#);
        assert!(err.is_err(), "expected CamelCase spelling to fail");
    }
}
