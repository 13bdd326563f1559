//! Wire types for the remote store protocol
//!
//! JSON over HTTP, camelCase field names. The payloads inside sync changes
//! and conflicts stay `serde_json::Value` so the engine can route them by
//! table name before committing to a shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Note, ScheduleDrawing, Stroke, ViewMode};

/// Operation carried by a sync change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncOperation {
    Update,
    Delete,
}

/// The unit exchanged with the remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChange {
    pub table: String,
    pub record_id: Uuid,
    pub operation: SyncOperation,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

/// A concurrent-update conflict reported by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub table: String,
    pub record_id: Uuid,
    pub server_timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
    pub server_payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    pub changes: Vec<SyncChange>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResponse {
    pub success: bool,
    pub changes_applied: u64,
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
    #[serde(default)]
    pub server_changes: Vec<SyncChange>,
    pub server_time: DateTime<Utc>,
}

/// Server acknowledgment of a single-record push
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedVersion {
    pub version: i64,
    pub server_time: DateTime<Utc>,
}

/// Body of every 409 response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBody {
    pub server_version: i64,
    pub server_payload: serde_json::Value,
}

/// Note content on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub event_id: Uuid,
    pub content: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_name_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_record_key: Option<String>,
}

impl From<&Note> for NotePayload {
    fn from(note: &Note) -> Self {
        Self {
            event_id: note.event_id,
            content: note.content.clone(),
            version: note.version,
            updated_at: note.updated_at,
            person_name_key: note.person_key.as_ref().map(|k| k.name_key.clone()),
            person_record_key: note.person_key.as_ref().map(|k| k.record_key.clone()),
        }
    }
}

/// Drawing content on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingPayload {
    pub book_id: Uuid,
    pub effective_date: NaiveDate,
    pub view_mode: ViewMode,
    pub strokes: Vec<Stroke>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&ScheduleDrawing> for DrawingPayload {
    fn from(drawing: &ScheduleDrawing) -> Self {
        Self {
            book_id: drawing.book_id,
            effective_date: drawing.effective_date,
            view_mode: drawing.view_mode,
            strokes: drawing.strokes.clone(),
            version: drawing.version,
            updated_at: drawing.updated_at,
        }
    }
}
