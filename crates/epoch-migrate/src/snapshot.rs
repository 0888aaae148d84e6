//! Snapshot-level migration orchestration.

use crate::events::{compact_events, normalize_records, sort_and_reindex};
use crate::meta::reconcile_meta;
use crate::MigrateError;
use epoch_core::key::decode_canonical_key;
use epoch_core::legacy::{LegacyModeData, LegacySessionData};
use epoch_core::{Mode, ModeData};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Schema versions that ever shipped; anything else is skipped as noise.
pub const VALID_VERSIONS: [&str; 3] = ["0.0.7", "0.1.1", "0.2.1"];

/// Build the full replacement snapshot from one loaded legacy snapshot.
///
/// Namespaces are processed independently and sequentially; any top-level
/// key other than the two namespaces is carried verbatim. All-or-nothing
/// per run: the first fatal error aborts with nothing written anywhere.
pub fn migrate_snapshot(root: &Value) -> Result<Value, MigrateError> {
    let mut out = match root {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(MigrateError::shape(
                "/",
                "store root is not an object",
                other,
            ))
        }
    };

    for mode in Mode::ALL {
        let Some(raw_mode) = out.get(mode.as_str()).cloned() else {
            info!(%mode, "namespace absent from snapshot; skipping");
            continue;
        };
        let migrated = migrate_mode(mode, &raw_mode)?;
        let value = serde_json::to_value(&migrated)
            .map_err(|err| MigrateError::Serialization(err.to_string()))?;
        out.insert(mode.as_str().to_string(), value);
    }

    Ok(Value::Object(out))
}

fn migrate_mode(mode: Mode, raw: &Value) -> Result<ModeData, MigrateError> {
    let namespace = raw
        .as_object()
        .ok_or_else(|| MigrateError::shape(mode.as_str(), "namespace is not an object", raw))?;

    if !namespace.contains_key("data") {
        info!(%mode, "namespace has no legacy data section; validating as canonical");
        let canonical: ModeData = serde_json::from_value(raw.clone()).map_err(|err| {
            MigrateError::shape(
                mode.as_str(),
                format!("namespace failed canonical validation: {err}"),
                raw,
            )
        })?;
        // Already-canonical event maps still get every storage key checked
        // against the four-field codec before being carried forward.
        for (session_id, events) in &canonical.events {
            for key in events.keys() {
                decode_canonical_key(key).map_err(|err| {
                    MigrateError::shape(
                        session_id,
                        format!("canonical event key rejected: {err}"),
                        &Value::String(key.clone()),
                    )
                })?;
            }
        }
        return Ok(canonical);
    }

    let legacy: LegacyModeData = serde_json::from_value(raw.clone()).map_err(|err| {
        MigrateError::shape(
            mode.as_str(),
            format!("namespace failed legacy validation: {err}"),
            raw,
        )
    })?;

    info!(%mode, sessions = legacy.meta.len(), "migrating namespace");
    let mut out = ModeData::default();

    for (session_id, legacy_meta) in &legacy.meta {
        if !VALID_VERSIONS.contains(&legacy_meta.version.as_str()) {
            warn!(
                %mode,
                %session_id,
                version = %legacy_meta.version,
                "unsupported schema version; skipping session"
            );
            continue;
        }

        let raw_session = legacy.data.get(session_id);
        let has_participants = raw_session
            .and_then(|value| value.get("participant"))
            .and_then(Value::as_object)
            .is_some_and(|records| !records.is_empty());
        if !has_participants {
            warn!(%mode, %session_id, "no participant records; skipping session");
            continue;
        }
        // has_participants implies the entry exists.
        let raw_session = raw_session.cloned().unwrap_or(Value::Null);

        let session: LegacySessionData =
            serde_json::from_value(raw_session.clone()).map_err(|err| {
                MigrateError::shape(
                    session_id,
                    format!("session data failed validation: {err}"),
                    &raw_session,
                )
            })?;

        info!(%mode, %session_id, "processing session");
        let mut events = normalize_records(&session.events)?;
        let participant_records = session.participant.clone().unwrap_or_default();
        events.extend(normalize_records(&participant_records)?);
        let ordered = sort_and_reindex(events);

        out.events
            .insert(session_id.clone(), compact_events(&ordered));
        out.meta
            .insert(session_id.clone(), reconcile_meta(legacy_meta, &session)?);
        out.other
            .insert(session_id.clone(), session.session.clone().unwrap_or_default());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use epoch_core::{EventValue, ModeData};
    use serde_json::json;

    fn legacy_snapshot() -> Value {
        json!({
            "live": {
                "meta": {
                    "s1": {
                        "sessionId": "s1",
                        "participantId": "p1",
                        "studyId": "study",
                        "version": "0.2.1",
                        "mode": "live",
                        "startTime": 50,
                        "lastUpdateTime": 120,
                        "bonus": 40.0
                    }
                },
                "data": {
                    "s1": {
                        "events": {
                            "100—1—bbbbbbb": {"eventType": "trial.start", "timestamp": 100}
                        },
                        "participant": {
                            "100—0—aaaaaaa": {
                                "eventType": "participant.init",
                                "timestamp": 100,
                                "pid": "p1",
                                "info": {"browser": "firefox"}
                            }
                        },
                        "session": {"bonus": 40}
                    }
                }
            },
            "config": {"untouched": true}
        })
    }

    fn mode_data(snapshot: &Value, mode: &str) -> ModeData {
        serde_json::from_value(snapshot[mode].clone()).expect("canonical mode data")
    }

    #[test]
    fn end_to_end_orders_participant_event_first() {
        let migrated = migrate_snapshot(&legacy_snapshot()).expect("migrate");
        let live = mode_data(&migrated, "live");

        let events = live.events.get("s1").expect("session events");
        assert_eq!(events.len(), 2);
        let participant_key = "100—0—participant.init—aaaaaaa";
        let trial_key = "100—1—trial.start—bbbbbbb";
        assert!(matches!(
            events.get(participant_key),
            Some(EventValue::Payload(_))
        ));
        assert!(matches!(events.get(trial_key), Some(EventValue::Payload(_))));

        let meta = live.meta.get("s1").expect("session meta");
        assert_eq!(meta.bonus, 40.0);
        assert_eq!(meta.last_update_time, 120);

        let other = live.other.get("s1").expect("other bucket");
        assert_eq!(other["bonus"], 40);
    }

    #[test]
    fn unrelated_top_level_keys_pass_through_verbatim() {
        let migrated = migrate_snapshot(&legacy_snapshot()).expect("migrate");
        assert_eq!(migrated["config"], json!({"untouched": true}));
    }

    #[test]
    fn absent_namespace_is_skipped_not_created() {
        let migrated = migrate_snapshot(&legacy_snapshot()).expect("migrate");
        assert!(migrated.get("debug").is_none());
    }

    #[test]
    fn unsupported_version_omits_the_session() {
        let mut snapshot = legacy_snapshot();
        snapshot["live"]["meta"]["s1"]["version"] = json!("9.9.9");
        let migrated = migrate_snapshot(&snapshot).expect("migrate");
        let live = mode_data(&migrated, "live");
        assert!(live.meta.is_empty());
        assert!(live.events.is_empty());
    }

    #[test]
    fn session_without_participant_records_is_omitted() {
        let mut snapshot = legacy_snapshot();
        snapshot["live"]["data"]["s1"]
            .as_object_mut()
            .expect("session object")
            .remove("participant");
        let migrated = migrate_snapshot(&snapshot).expect("migrate");
        let live = mode_data(&migrated, "live");
        assert!(live.meta.is_empty());
    }

    #[test]
    fn malformed_event_fails_the_whole_run() {
        let mut snapshot = legacy_snapshot();
        snapshot["live"]["data"]["s1"]["events"]["100—2—ccccccc"] = json!({"timestamp": 100});
        let err = migrate_snapshot(&snapshot).expect_err("must fail");
        assert!(matches!(err, MigrateError::Shape { .. }));
    }

    #[test]
    fn canonical_namespace_passes_through_unchanged() {
        let canonical = json!({
            "debug": {
                "meta": {
                    "s2": {
                        "sessionId": "s2",
                        "participantId": "p2",
                        "studyId": "study",
                        "version": "0.2.1",
                        "mode": "debug",
                        "startTime": 1,
                        "lastUpdateTime": 2,
                        "bonus": 0.0
                    }
                },
                "events": {"s2": {"1—0—trial.start—abcdefg": {"arm": 0}}},
                "other": {"s2": {}}
            }
        });
        let migrated = migrate_snapshot(&canonical).expect("migrate");
        let debug = mode_data(&migrated, "debug");
        assert!(debug.meta.contains_key("s2"));
        assert!(debug.events["s2"].contains_key("1—0—trial.start—abcdefg"));
    }

    #[test]
    fn canonical_namespace_with_bad_event_key_is_rejected() {
        let mut snapshot = json!({
            "debug": {
                "meta": {},
                "events": {"s2": {"not-an-event-key": {"arm": 0}}},
                "other": {}
            }
        });
        let err = migrate_snapshot(&snapshot).expect_err("must fail");
        assert!(matches!(err, MigrateError::Shape { .. }));
        assert!(err.to_string().contains("not-an-event-key"));

        // Legacy three-field arity is not canonical either.
        snapshot["debug"]["events"]["s2"] = json!({"1—0—abcdefg": {"arm": 0}});
        let err = migrate_snapshot(&snapshot).expect_err("must fail");
        assert!(matches!(err, MigrateError::Shape { .. }));
    }

    #[test]
    fn invalid_canonical_namespace_is_a_shape_error() {
        let snapshot = json!({"debug": {"meta": {"s2": {"sessionId": "s2"}}, "events": {}}});
        let err = migrate_snapshot(&snapshot).expect_err("must fail");
        assert!(matches!(err, MigrateError::Shape { .. }));
    }

    #[test]
    fn non_object_root_is_rejected_and_null_is_empty() {
        assert!(migrate_snapshot(&json!([1, 2])).is_err());
        let migrated = migrate_snapshot(&Value::Null).expect("empty snapshot");
        assert_eq!(migrated, json!({}));
    }
}
