//! Shared contracts for the session log store: the canonical event and
//! metadata shapes, the compact event key codec, and the legacy shapes the
//! migration reads from.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod key;
pub mod legacy;

/// Isolation partition of the store: production data vs test data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Debug,
}

impl Mode {
    /// Migration order: debug first, so mistakes surface on test data.
    pub const ALL: [Mode; 2] = [Mode::Debug, Mode::Live];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Debug => "debug",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "live" => Ok(Mode::Live),
            "debug" => Ok(Mode::Debug),
            other => Err(format!("Unknown mode: {other}")),
        }
    }
}

/// One canonical log event within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event_type: String,
    /// Reconstructed by the event replayer after migration; empty here.
    pub current_epoch_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    /// Dense 0-based position within the session after normalization.
    pub index: u32,
    pub uid: String,
    pub data: Map<String, Value>,
}

impl LogEvent {
    /// The canonical compact storage key for this event.
    pub fn storage_key(&self) -> String {
        key::encode_key(self.timestamp, self.index, &self.event_type, &self.uid)
    }

    /// Participant-class events sort before anything else at equal
    /// `(timestamp, index)`.
    pub fn is_participant(&self) -> bool {
        self.event_type.starts_with("participant.")
    }
}

/// Canonical per-session metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    pub participant_id: String,
    pub study_id: String,
    pub version: String,
    pub mode: Mode,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<i64>,
    pub last_update_time: i64,
    pub bonus: f64,
}

/// Value stored under an event key: the event payload, or the literal
/// `false` tombstone standing in for a deleted/collapsed event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Payload(Map<String, Value>),
    Tombstone,
}

impl Serialize for EventValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            EventValue::Payload(payload) => payload.serialize(serializer),
            EventValue::Tombstone => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for EventValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Object(payload) => Ok(EventValue::Payload(payload)),
            Value::Bool(false) => Ok(EventValue::Tombstone),
            other => Err(D::Error::custom(format!(
                "expected event payload object or false tombstone, got {other}"
            ))),
        }
    }
}

/// Compacted events of one session, keyed by the canonical event key.
pub type SessionEvents = BTreeMap<String, EventValue>;

/// Canonical contents of one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModeData {
    pub meta: BTreeMap<String, SessionMeta>,
    pub events: BTreeMap<String, SessionEvents>,
    /// Free-form session-scoped payloads carried over unvalidated.
    #[serde(default)]
    pub other: BTreeMap<String, Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_event_serializes_with_wire_names() {
        let event = LogEvent {
            event_type: "trial.start".to_string(),
            current_epoch_id: String::new(),
            timestamp: 100,
            index: 0,
            uid: "abcdefg".to_string(),
            data: Map::new(),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["eventType"], "trial.start");
        assert_eq!(value["currentEpochId"], "");
        assert_eq!(value["timestamp"], 100);
    }

    #[test]
    fn session_meta_omits_absent_completion_time() {
        let meta = SessionMeta {
            session_id: "s1".to_string(),
            participant_id: "p1".to_string(),
            study_id: "study".to_string(),
            version: "0.2.1".to_string(),
            mode: Mode::Live,
            start_time: 1,
            completion_time: None,
            last_update_time: 2,
            bonus: 0.0,
        };
        let value = serde_json::to_value(&meta).expect("serialize");
        assert!(value.get("completionTime").is_none());
        assert_eq!(value["lastUpdateTime"], 2);
    }

    #[test]
    fn event_value_round_trips_payload_and_tombstone() {
        let payload: EventValue = serde_json::from_value(json!({"arm": 1})).expect("payload");
        assert!(matches!(payload, EventValue::Payload(_)));

        let tombstone: EventValue = serde_json::from_value(json!(false)).expect("tombstone");
        assert_eq!(tombstone, EventValue::Tombstone);
        assert_eq!(serde_json::to_value(&tombstone).expect("serialize"), json!(false));
    }

    #[test]
    fn event_value_rejects_other_scalars() {
        assert!(serde_json::from_value::<EventValue>(json!(true)).is_err());
        assert!(serde_json::from_value::<EventValue>(json!("gone")).is_err());
    }

    #[test]
    fn mode_parses_and_formats() {
        assert_eq!("live".parse::<Mode>().expect("parse"), Mode::Live);
        assert_eq!(Mode::Debug.to_string(), "debug");
        assert!("prod".parse::<Mode>().is_err());
    }
}
