//! Legacy store shapes read by the migration.
//!
//! These mirror the historical layout `/{mode}/meta/{sessionId}` plus
//! `/{mode}/data/{sessionId}/{events,participant,session}`. Event records
//! stay untyped (`serde_json::Value`) and are validated record by record in
//! the normalizer; everything unknown is carried in `extra` buckets rather
//! than rejected at parse time.

use crate::Mode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Session metadata as written by historical client versions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacySessionMeta {
    pub session_id: String,
    pub participant_id: String,
    pub study_id: String,
    pub version: String,
    pub mode: Mode,
    pub start_time: i64,
    #[serde(default)]
    pub completion_time: Option<i64>,
    #[serde(default)]
    pub last_update_time: Option<i64>,
    /// Older spelling of `lastUpdateTime`.
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub bonus: Option<f64>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// One session's legacy data subtree.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LegacySessionData {
    pub events: BTreeMap<String, Value>,
    #[serde(default)]
    pub participant: Option<BTreeMap<String, Value>>,
    /// Free-form session-scoped payload bucket (bonus totals etc).
    #[serde(default)]
    pub session: Option<Map<String, Value>>,
    /// Duplicated metadata written under the session's own payload by a
    /// historical storage-path bug. Preserved as an explicit fallback
    /// source; see the meta reconciler.
    #[serde(default)]
    pub live: Option<LegacyDupBucket>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LegacyDupBucket {
    pub meta: BTreeMap<String, LegacyDupMeta>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDupMeta {
    #[serde(default)]
    pub bonus: Option<f64>,
    #[serde(default)]
    pub completion_time: Option<i64>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// One namespace in the legacy layout.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LegacyModeData {
    pub meta: BTreeMap<String, LegacySessionMeta>,
    /// Per-session subtrees, parsed into [`LegacySessionData`] one session
    /// at a time so a single malformed session names itself in the error.
    pub data: BTreeMap<String, Value>,
}
