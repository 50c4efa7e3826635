//! Status conditions with upsert-by-type semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall usability of the EIP.
pub const TYPE_READY: &str = "Ready";
/// Last external sync succeeded.
pub const TYPE_SYNCED: &str = "Synced";
/// An operation against the provider is in flight.
pub const TYPE_PROGRESSING: &str = "Progressing";

pub const REASON_CREATING: &str = "Creating";
pub const REASON_CREATED: &str = "Created";
pub const REASON_UPDATING: &str = "Updating";
pub const REASON_UPDATED: &str = "Updated";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_DELETED: &str = "Deleted";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";
pub const REASON_THROTTLED: &str = "Throttled";
pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_SYNCED: &str = "Synced";
pub const REASON_RELEASE_FAILED: &str = "ReleaseFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Insert or update the condition of the given type.
///
/// The transition time only moves when the status changes; a reason or
/// message change alone keeps the previous timestamp.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    observed_generation: i64,
    now: DateTime<Utc>,
) {
    let message = message.into();
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = now.max(existing.last_transition_time);
            }
            existing.reason = reason.to_string();
            existing.message = message;
            existing.observed_generation = observed_generation;
        }
        None => conditions.push(Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message,
            observed_generation,
            last_transition_time: now,
        }),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_new_condition() {
        let mut conditions = Vec::new();
        let now = Utc::now();
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::True,
            REASON_AVAILABLE,
            "ok",
            1,
            now,
        );

        assert_eq!(conditions.len(), 1);
        let ready = find_condition(&conditions, TYPE_READY).unwrap();
        assert!(ready.is_true());
        assert_eq!(ready.last_transition_time, now);
        assert_eq!(ready.observed_generation, 1);
    }

    #[test]
    fn test_same_status_keeps_transition_time() {
        let mut conditions = Vec::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::False,
            REASON_THROTTLED,
            "a",
            1,
            t0,
        );
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::False,
            REASON_SYNC_FAILED,
            "b",
            2,
            t1,
        );

        let ready = find_condition(&conditions, TYPE_READY).unwrap();
        assert_eq!(ready.last_transition_time, t0);
        assert_eq!(ready.reason, REASON_SYNC_FAILED);
        assert_eq!(ready.message, "b");
        assert_eq!(ready.observed_generation, 2);
    }

    #[test]
    fn test_status_change_moves_transition_time() {
        let mut conditions = Vec::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::False,
            REASON_SYNC_FAILED,
            "x",
            1,
            t0,
        );
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::True,
            REASON_AVAILABLE,
            "y",
            1,
            t1,
        );

        let ready = find_condition(&conditions, TYPE_READY).unwrap();
        assert_eq!(ready.last_transition_time, t1);
        assert!(ready.is_true());
    }

    #[test]
    fn test_transition_time_never_goes_backwards() {
        let mut conditions = Vec::new();
        let t0 = Utc::now();
        let earlier = t0 - Duration::seconds(30);
        set_condition(
            &mut conditions,
            TYPE_SYNCED,
            ConditionStatus::True,
            REASON_SYNCED,
            "",
            1,
            t0,
        );
        set_condition(
            &mut conditions,
            TYPE_SYNCED,
            ConditionStatus::False,
            REASON_SYNC_FAILED,
            "",
            1,
            earlier,
        );

        assert_eq!(find_condition(&conditions, TYPE_SYNCED).unwrap().last_transition_time, t0);
    }

    #[test]
    fn test_one_entry_per_type() {
        let mut conditions = Vec::new();
        let now = Utc::now();
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::True,
            REASON_AVAILABLE,
            "",
            1,
            now,
        );
        set_condition(
            &mut conditions,
            TYPE_SYNCED,
            ConditionStatus::True,
            REASON_SYNCED,
            "",
            1,
            now,
        );
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::False,
            REASON_SYNC_FAILED,
            "",
            1,
            now,
        );
        set_condition(
            &mut conditions,
            TYPE_PROGRESSING,
            ConditionStatus::True,
            REASON_CREATING,
            "",
            1,
            now,
        );

        assert_eq!(conditions.len(), 3);
        let ready = find_condition(&conditions, TYPE_READY).unwrap();
        assert_eq!(ready.reason, REASON_SYNC_FAILED);
    }
}
