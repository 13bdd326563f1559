//! Note - handwritten content attached to exactly one event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::PersonKey;

/// Handwriting content for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,

    /// Owning event (1:1)
    pub event_id: Uuid,

    /// Serialized ink, opaque to the engine
    pub content: String,

    pub version: i64,
    pub dirty: bool,
    pub updated_at: DateTime<Utc>,

    /// Cache metadata driving eviction
    pub cached_at: DateTime<Utc>,
    pub hit_count: i64,

    /// Person identity shared with other events' notes, if known
    pub person_key: Option<PersonKey>,

    /// Edit lock: device currently holding this note open
    pub locked_by_device: Option<Uuid>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn new(event_id: Uuid, content: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            content,
            version: 0,
            dirty: true,
            updated_at: now,
            cached_at: now,
            hit_count: 0,
            person_key: None,
            locked_by_device: None,
            locked_at: None,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Content size in bytes, as accounted by the cache budget
    pub fn content_size(&self) -> i64 {
        self.content.len() as i64
    }
}
