//! Book - a container of appointment events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An appointment book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier, stable across devices
    pub id: Uuid,

    /// Human-friendly name
    pub name: String,

    pub created_at: DateTime<Utc>,

    /// Set when the book is archived; archived books keep their records
    pub archived_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn new(name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at,
            archived_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
