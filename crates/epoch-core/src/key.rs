//! Compact event key codec.
//!
//! Canonical event storage keys pack `(timestamp, index, eventType, uid)`
//! into a single em-dash separated string so the compacted event map needs
//! no per-entry ordering metadata. Legacy storage keys used the same scheme
//! without the type discriminator, so the decoder accepts both arities.

use thiserror::Error;

/// Separator used by both the legacy and the canonical key schemes.
pub const KEY_SEPARATOR: char = '—';

/// Required uid width for every event key, old or new.
pub const UID_LEN: usize = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventKeyError {
    #[error("event key {key:?} splits into {found} fields, expected 3 or 4")]
    FieldCount { key: String, found: usize },
    #[error("event key {key:?} carries uid {uid:?}, expected exactly {UID_LEN} characters")]
    InvalidUid { key: String, uid: String },
    #[error("event key {key:?} has a non-numeric {field} field: {value:?}")]
    NonNumeric {
        key: String,
        field: &'static str,
        value: String,
    },
    #[error("event key {key:?} uses the legacy three-field form where the canonical four-field form is required")]
    LegacyArity { key: String },
}

/// Ordering metadata recovered from an event storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub timestamp: i64,
    pub index: u32,
    pub uid: String,
}

/// Build the canonical four-field key for an event.
pub fn encode_key(timestamp: i64, index: u32, event_type: &str, uid: &str) -> String {
    format!(
        "{timestamp}{KEY_SEPARATOR}{index}{KEY_SEPARATOR}{event_type}{KEY_SEPARATOR}{uid}"
    )
}

/// Recover `(timestamp, index, uid)` from a storage key.
///
/// Accepts the legacy three-field form `timestamp—index—uid` and the
/// canonical four-field form `timestamp—index—eventType—uid`; the uid is
/// always the last field.
pub fn decode_key(key: &str) -> Result<DecodedKey, EventKeyError> {
    let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    let (timestamp_raw, index_raw, uid_raw) = match parts.as_slice() {
        [timestamp, index, uid] => (*timestamp, *index, *uid),
        [timestamp, index, _event_type, uid] => (*timestamp, *index, *uid),
        _ => {
            return Err(EventKeyError::FieldCount {
                key: key.to_string(),
                found: parts.len(),
            })
        }
    };

    if uid_raw.chars().count() != UID_LEN {
        return Err(EventKeyError::InvalidUid {
            key: key.to_string(),
            uid: uid_raw.to_string(),
        });
    }

    let timestamp = timestamp_raw
        .parse::<i64>()
        .map_err(|_| EventKeyError::NonNumeric {
            key: key.to_string(),
            field: "timestamp",
            value: timestamp_raw.to_string(),
        })?;
    let index = index_raw
        .parse::<u32>()
        .map_err(|_| EventKeyError::NonNumeric {
            key: key.to_string(),
            field: "index",
            value: index_raw.to_string(),
        })?;

    Ok(DecodedKey {
        timestamp,
        index,
        uid: uid_raw.to_string(),
    })
}

/// Recover `(timestamp, index, uid)` from a canonical storage key.
///
/// Unlike [`decode_key`], the legacy three-field arity is an error: data
/// that claims to already be canonical must carry the type discriminator.
pub fn decode_canonical_key(key: &str) -> Result<DecodedKey, EventKeyError> {
    match key.split(KEY_SEPARATOR).count() {
        4 => decode_key(key),
        3 => Err(EventKeyError::LegacyArity {
            key: key.to_string(),
        }),
        found => Err(EventKeyError::FieldCount {
            key: key.to_string(),
            found,
        }),
    }
}
