//! Event recorder for EIP objects.
//!
//! Every significant transition is written to tracing under the `events`
//! target and kept in a bounded in-process history that tests and the
//! binary can query per object.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

pub const REASON_CREATED: &str = "Created";
pub const REASON_UPDATED: &str = "Updated";
pub const REASON_THROTTLED: &str = "Throttled";
pub const REASON_RELEASED: &str = "Released";
pub const REASON_ALREADY_RELEASED: &str = "AlreadyReleased";
pub const REASON_SKIPPED: &str = "Skipped";
pub const REASON_RELEASE_FAILED: &str = "ReleaseFailed";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_ALLOCATION_NOT_RECORDED: &str = "AllocationNotRecorded";

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
            EventType::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub object: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

pub struct EventRecorder {
    capacity: usize,
    history: Mutex<VecDeque<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn normal(&self, object: &str, reason: &str, message: impl Into<String>) {
        self.record(object, EventType::Normal, reason, message.into());
    }

    pub fn warning(&self, object: &str, reason: &str, message: impl Into<String>) {
        self.record(object, EventType::Warning, reason, message.into());
    }

    fn record(&self, object: &str, event_type: EventType, reason: &str, message: String) {
        match event_type {
            EventType::Normal => info!(target: "events", name = %object, %reason, "{}", message),
            EventType::Warning => warn!(target: "events", name = %object, %reason, "{}", message),
        }

        let event = Event {
            timestamp: Utc::now(),
            object: object.to_string(),
            event_type,
            reason: reason.to_string(),
            message,
        };

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Events recorded for one object, oldest first.
    pub fn events_for(&self, object: &str) -> Vec<Event> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.object == object)
            .cloned()
            .collect()
    }

    /// Reasons recorded for one object, oldest first.
    pub fn reasons_for(&self, object: &str) -> Vec<String> {
        self.events_for(object).into_iter().map(|e| e.reason).collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_kept_per_object() {
        let recorder = EventRecorder::new();
        recorder.normal("a", REASON_CREATED, "Created EIP eip-1");
        recorder.warning("b", REASON_THROTTLED, "slow down");
        recorder.normal("a", REASON_UPDATED, "Bandwidth changed to 10");

        let events = recorder.events_for("a");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, REASON_CREATED);
        assert_eq!(events[0].event_type, EventType::Normal);
        assert_eq!(recorder.reasons_for("b"), vec![REASON_THROTTLED]);
    }

    #[test]
    fn test_history_is_bounded() {
        let recorder = EventRecorder::with_capacity(2);
        recorder.normal("a", REASON_CREATED, "1");
        recorder.normal("a", REASON_UPDATED, "2");
        recorder.normal("a", REASON_RELEASED, "3");

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.reasons_for("a"), vec![REASON_UPDATED, REASON_RELEASED]);
    }
}
