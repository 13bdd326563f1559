//! ScheduleDrawing - a handwriting overlay on a calendar view
//!
//! Keyed by (book, effective date, view mode). Unlike notes, drawing content
//! is structured: a list of strokes with stable ids, so a conflict merge can
//! combine two divergent stroke sets without duplicating ink.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Calendar view a drawing is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Day,
    Week,
    Month,
}

/// One pen stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Stable identity; the conflict merge deduplicates by it
    pub id: Uuid,
    pub points: Vec<[f32; 2]>,
    pub width: f32,
    pub color: u32,
}

/// Handwriting overlay for one calendar page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDrawing {
    pub id: Uuid,
    pub book_id: Uuid,
    pub effective_date: NaiveDate,
    pub view_mode: ViewMode,

    pub strokes: Vec<Stroke>,

    pub version: i64,
    pub dirty: bool,
    pub updated_at: DateTime<Utc>,

    pub cached_at: DateTime<Utc>,
    pub hit_count: i64,
}

impl ScheduleDrawing {
    pub fn new(
        book_id: Uuid,
        effective_date: NaiveDate,
        view_mode: ViewMode,
        strokes: Vec<Stroke>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            effective_date,
            view_mode,
            strokes,
            version: 0,
            dirty: true,
            updated_at: now,
            cached_at: now,
            hit_count: 0,
        }
    }
}

/// Append-only conflict merge: server strokes first, then every local stroke
/// whose id the server side does not already contain. Never drops ink; a
/// racing retry cannot duplicate a stroke because identity is stable.
pub fn merge_strokes(server: Vec<Stroke>, local: Vec<Stroke>) -> Vec<Stroke> {
    let seen: HashSet<Uuid> = server.iter().map(|s| s.id).collect();
    let mut merged = server;
    merged.extend(local.into_iter().filter(|s| !seen.contains(&s.id)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke() -> Stroke {
        Stroke {
            id: Uuid::new_v4(),
            points: vec![[0.0, 0.0], [1.0, 1.0]],
            width: 2.0,
            color: 0xff000000,
        }
    }

    #[test]
    fn merge_appends_local_after_server() {
        let server = vec![stroke(), stroke()];
        let local = vec![stroke(), stroke(), stroke()];
        let merged = merge_strokes(server.clone(), local.clone());

        assert_eq!(merged.len(), server.len() + local.len());
        assert_eq!(merged[..server.len()], server[..]);
        assert_eq!(merged[server.len()..], local[..]);
    }

    #[test]
    fn merge_deduplicates_by_stroke_id() {
        let shared = stroke();
        let server = vec![shared.clone(), stroke()];
        let local = vec![shared.clone(), stroke()];

        let merged = merge_strokes(server, local);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.iter().filter(|s| s.id == shared.id).count(), 1);
    }
}
