//! Migration of the legacy per-record session log layout into the compact
//! canonical layout.
//!
//! All computation here is pure and in-memory: the orchestrator takes one
//! loaded snapshot and produces one full replacement snapshot. Any fatal
//! error aborts the run before a single byte reaches the store.

use epoch_core::key::EventKeyError;
use thiserror::Error;

mod events;
mod meta;
mod snapshot;

pub use events::{compact_events, normalize_records, sort_and_reindex};
pub use meta::reconcile_meta;
pub use snapshot::{migrate_snapshot, VALID_VERSIONS};

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Shape-class failure: a record or namespace does not match its
    /// expected class shape. The offending record is printed verbatim.
    #[error("record {key:?} does not match expected shape: {reason}; record: {record}")]
    Shape {
        key: String,
        reason: String,
        record: String,
    },
    /// Shape-class failure: an unexpectedly absent dataset rather than a
    /// legitimate zero-event session.
    #[error("no records to convert")]
    EmptyRecords,
    /// Key-embedded timestamp disagrees with the payload timestamp beyond
    /// the tolerance left by legacy double-write races.
    #[error("timestamp mismatch for record {key:?}: payload {payload_ts} vs key {key_ts}")]
    Consistency {
        key: String,
        payload_ts: i64,
        key_ts: i64,
    },
    /// No fallback source resolved a required metadata field.
    #[error("session {session_id}: no source resolves required field {field:?}")]
    FieldMissing {
        session_id: String,
        field: &'static str,
    },
    #[error(transparent)]
    Key(#[from] EventKeyError),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl MigrateError {
    pub(crate) fn shape(key: &str, reason: impl Into<String>, record: &serde_json::Value) -> Self {
        MigrateError::Shape {
            key: key.to_string(),
            reason: reason.into(),
            record: record.to_string(),
        }
    }
}
