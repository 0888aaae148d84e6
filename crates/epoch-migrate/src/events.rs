//! Event normalization, ordering, and compaction.

use crate::MigrateError;
use epoch_core::key::decode_key;
use epoch_core::{EventValue, LogEvent, SessionEvents};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Tolerance between the payload timestamp and the key-embedded timestamp,
/// left over from legacy double-write races.
const TIMESTAMP_TOLERANCE_MS: i64 = 100;

/// Validate and convert a map of legacy per-key records into canonical
/// events, recovering ordering metadata from each storage key.
///
/// An empty map fails: a session selected for migration always carries at
/// least one record, so an empty map means the dataset is absent.
pub fn normalize_records(
    records: &BTreeMap<String, Value>,
) -> Result<Vec<LogEvent>, MigrateError> {
    if records.is_empty() {
        return Err(MigrateError::EmptyRecords);
    }
    records
        .iter()
        .map(|(key, raw)| normalize_record(key, raw))
        .collect()
}

fn normalize_record(key: &str, raw: &Value) -> Result<LogEvent, MigrateError> {
    let record = raw
        .as_object()
        .ok_or_else(|| MigrateError::shape(key, "event is not an object", raw))?;

    let event_type = record
        .get("eventType")
        .and_then(Value::as_str)
        .ok_or_else(|| MigrateError::shape(key, "missing or non-string eventType", raw))?
        .to_string();
    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| MigrateError::shape(key, "missing or non-numeric timestamp", raw))?;

    let decoded = decode_key(key)?;
    if (timestamp - decoded.timestamp).abs() >= TIMESTAMP_TOLERANCE_MS {
        return Err(MigrateError::Consistency {
            key: key.to_string(),
            payload_ts: timestamp,
            key_ts: decoded.timestamp,
        });
    }

    let mut data: Map<String, Value> = record
        .iter()
        .filter(|(field, _)| field.as_str() != "eventType" && field.as_str() != "timestamp")
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    if event_type.starts_with("participant.") {
        if data.len() != 2 {
            return Err(MigrateError::shape(
                key,
                "participant event must carry exactly pid and info",
                raw,
            ));
        }
        if !data.get("pid").is_some_and(Value::is_string) {
            return Err(MigrateError::shape(
                key,
                "participant event missing string pid",
                raw,
            ));
        }
        if !data.contains_key("info") {
            return Err(MigrateError::shape(key, "participant event missing info", raw));
        }
    }

    if event_type.starts_with("epoch") {
        // Older clients wrote the epoch identifier under `_uid`.
        if let Some(id) = data.remove("_uid") {
            data.insert("id".to_string(), id);
        }
        if data.len() != 1 || !data.get("id").is_some_and(Value::is_string) {
            return Err(MigrateError::shape(
                key,
                "epoch event must carry a single string id",
                raw,
            ));
        }
    }

    Ok(LogEvent {
        event_type,
        // Reconstructed by the replayer once the canonical layout is live.
        current_epoch_id: String::new(),
        timestamp,
        index: decoded.index,
        uid: decoded.uid,
        data,
    })
}

/// Impose the total event order and assign dense 0-based indices.
///
/// Order: timestamp, then legacy index, then participant-class events before
/// anything else, then uid. The legacy index is discarded afterwards; output
/// indices are exactly `0..N-1`.
pub fn sort_and_reindex(mut events: Vec<LogEvent>) -> Vec<LogEvent> {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.index.cmp(&b.index))
            .then_with(|| b.is_participant().cmp(&a.is_participant()))
            .then_with(|| a.uid.cmp(&b.uid))
    });
    for (index, event) in events.iter_mut().enumerate() {
        event.index = index as u32;
    }
    events
}

/// Compact ordered events into the canonical keyed map.
pub fn compact_events(events: &[LogEvent]) -> SessionEvents {
    events
        .iter()
        .map(|event| (event.storage_key(), EventValue::Payload(event.data.clone())))
        .collect()
}
