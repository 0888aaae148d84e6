//! Session metadata reconciliation across historical schema versions.

use crate::MigrateError;
use epoch_core::legacy::{LegacySessionData, LegacySessionMeta};
use epoch_core::SessionMeta;
use serde_json::Value;
use std::collections::BTreeMap;

/// Terminal marker event; its timestamp stands in for a missing
/// completion time.
const COMPLETION_EVENT_TYPE: &str = "experiment.complete";

/// Merge the legacy metadata sources of one session into the canonical
/// shape.
///
/// `bonus` resolves from exactly three sources in priority order: the
/// duplicated meta nested inside the session's own payload (a historical
/// storage-path bug, not a convention), the top-level legacy `bonus`, and
/// the `session.bonus` path older clients wrote. `completionTime` may also
/// come from the duplication bucket, then the explicit field, then the
/// terminal event. `lastUpdateTime` is the maximum of the two historical
/// spellings.
pub fn reconcile_meta(
    meta: &LegacySessionMeta,
    session: &LegacySessionData,
) -> Result<SessionMeta, MigrateError> {
    let session_id = meta.session_id.clone();
    let dup_meta = session
        .live
        .as_ref()
        .and_then(|bucket| bucket.meta.get(&session_id));

    let bonus = dup_meta
        .and_then(|dup| dup.bonus)
        .or(meta.bonus)
        .or_else(|| {
            session
                .session
                .as_ref()
                .and_then(|payload| payload.get("bonus"))
                .and_then(Value::as_f64)
        })
        .ok_or_else(|| MigrateError::FieldMissing {
            session_id: session_id.clone(),
            field: "bonus",
        })?;

    let completion_time = dup_meta
        .and_then(|dup| dup.completion_time)
        .or(meta.completion_time)
        .or_else(|| completion_event_time(&session.events));

    let last_update_time = match (meta.last_update_time, meta.last_update) {
        (None, None) => {
            return Err(MigrateError::FieldMissing {
                session_id,
                field: "lastUpdateTime",
            })
        }
        (current, legacy) => current.unwrap_or(i64::MIN).max(legacy.unwrap_or(i64::MIN)),
    };

    Ok(SessionMeta {
        session_id,
        participant_id: meta.participant_id.clone(),
        study_id: meta.study_id.clone(),
        version: meta.version.clone(),
        mode: meta.mode,
        start_time: meta.start_time,
        completion_time,
        last_update_time,
        bonus,
    })
}

fn completion_event_time(events: &BTreeMap<String, Value>) -> Option<i64> {
    events
        .values()
        .find(|record| {
            record.get("eventType").and_then(Value::as_str) == Some(COMPLETION_EVENT_TYPE)
        })
        .and_then(|record| record.get("timestamp"))
        .and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use epoch_core::Mode;
    use serde_json::json;

    fn legacy_meta(bonus: Option<f64>) -> LegacySessionMeta {
        serde_json::from_value(json!({
            "sessionId": "s1",
            "participantId": "p1",
            "studyId": "study",
            "version": "0.2.1",
            "mode": "live",
            "startTime": 10,
            "lastUpdateTime": 50,
            "bonus": bonus,
        }))
        .expect("legacy meta")
    }

    fn session_data(value: Value) -> LegacySessionData {
        serde_json::from_value(value).expect("session data")
    }

    #[test]
    fn direct_bonus_field_wins_without_duplication_bucket() {
        let meta = legacy_meta(Some(125.0));
        let session = session_data(json!({"events": {}}));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.bonus, 125.0);
        assert_eq!(reconciled.mode, Mode::Live);
    }

    #[test]
    fn session_bonus_path_is_the_last_fallback() {
        let meta = legacy_meta(None);
        let session = session_data(json!({"events": {}, "session": {"bonus": 500}}));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.bonus, 500.0);
    }

    #[test]
    fn duplication_bucket_wins_over_everything() {
        let meta = legacy_meta(Some(10.0));
        let session = session_data(json!({
            "events": {},
            "session": {"bonus": 500},
            "live": {"meta": {"s1": {"bonus": 777.0, "completionTime": 60}}}
        }));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.bonus, 777.0);
        assert_eq!(reconciled.completion_time, Some(60));
    }

    #[test]
    fn unresolvable_bonus_is_a_field_missing_error() {
        let meta = legacy_meta(None);
        let session = session_data(json!({"events": {}}));
        let err = reconcile_meta(&meta, &session).expect_err("must fail");
        assert!(matches!(
            err,
            MigrateError::FieldMissing { field: "bonus", .. }
        ));
    }

    #[test]
    fn completion_time_falls_back_to_terminal_event() {
        let meta = legacy_meta(Some(1.0));
        let session = session_data(json!({
            "events": {
                "90—0—abcdefg": {"eventType": "trial.start", "timestamp": 90},
                "95—1—bcdefgh": {"eventType": "experiment.complete", "timestamp": 95}
            }
        }));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.completion_time, Some(95));
    }

    #[test]
    fn incomplete_session_keeps_completion_time_unset() {
        let meta = legacy_meta(Some(1.0));
        let session = session_data(json!({
            "events": {"90—0—abcdefg": {"eventType": "trial.start", "timestamp": 90}}
        }));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.completion_time, None);
    }

    #[test]
    fn last_update_time_takes_the_maximum_spelling() {
        let mut meta = legacy_meta(Some(1.0));
        meta.last_update_time = Some(50);
        meta.last_update = Some(80);
        let session = session_data(json!({"events": {}}));
        let reconciled = reconcile_meta(&meta, &session).expect("reconcile");
        assert_eq!(reconciled.last_update_time, 80);
    }

    #[test]
    fn missing_both_update_spellings_fails() {
        let mut meta = legacy_meta(Some(1.0));
        meta.last_update_time = None;
        meta.last_update = None;
        let session = session_data(json!({"events": {}}));
        let err = reconcile_meta(&meta, &session).expect_err("must fail");
        assert!(matches!(
            err,
            MigrateError::FieldMissing {
                field: "lastUpdateTime",
                ..
            }
        ));
    }
}
