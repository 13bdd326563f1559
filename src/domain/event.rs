//! Event - a single appointment within a book
//!
//! Events are never physically deleted by normal edits. Removal is a soft
//! state, and rescheduling replaces the event with a new linked one so the
//! full history of time changes stays auditable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category tag for an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Appointment,
    Consultation,
    FollowUp,
    Blocker,
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Appointment
    }
}

/// An appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,

    /// Book this event belongs to
    pub book_id: Uuid,

    /// Display name, usually the person's name
    pub title: String,

    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,

    /// External record number (e.g. a chart number); empty means unknown
    pub record_number: Option<String>,

    pub kind: EventKind,

    /// Soft-removal state; removed events stay in the store
    pub is_removed: bool,
    pub removal_reason: Option<String>,

    /// Reschedule chain: set on the replacement, pointing at the original
    pub original_event_id: Option<Uuid>,
    /// Reschedule chain: set on the original, pointing at the replacement
    pub new_event_id: Option<Uuid>,

    /// Optimistic-concurrency version, advanced by the server on accept
    pub version: i64,

    /// Written locally, not yet confirmed synced
    pub dirty: bool,

    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        book_id: Uuid,
        title: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            title,
            starts_at,
            ends_at,
            record_number: None,
            kind: EventKind::default(),
            is_removed: false,
            removal_reason: None,
            original_event_id: None,
            new_event_id: None,
            version: 0,
            dirty: true,
            updated_at: now,
        }
    }

    /// Whether this event was replaced by a rescheduled successor
    pub fn is_rescheduled(&self) -> bool {
        self.new_event_id.is_some()
    }

    /// Record number with empty strings treated as absent
    pub fn record_number(&self) -> Option<&str> {
        self.record_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}
