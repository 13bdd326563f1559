//! Typed store facade over the database
//!
//! Every service reads and writes records through this layer. Writes stamp
//! exactly the fields the caller hands over; version and dirty bookkeeping
//! policy belongs to the callers (services), not to the store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use super::entities::{self, book, cache_policy, drawing, event, note, sync_state};
use super::Database;
use crate::domain::{Book, Event, EventKind, Note, PersonKey, ScheduleDrawing, Stroke, ViewMode};

/// Local store failures; the only error class that propagates synchronously
/// out of a save
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid {field} value stored: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Cache eviction configuration, a singleton row
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub max_cache_size_mb: i64,
    pub cache_duration_days: i64,
    pub auto_cleanup: bool,
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_cache_size_mb: 200,
            cache_duration_days: 90,
            auto_cleanup: true,
            last_cleanup_at: None,
        }
    }
}

#[derive(FromQueryResult)]
struct SumRow {
    total: Option<i64>,
}

/// Typed access to the durable record store
pub struct LocalStore {
    db: Arc<Database>,
}

impl LocalStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.db.conn()
    }

    // ---- books ----

    pub async fn put_book(&self, record: &Book) -> Result<(), StoreError> {
        let active = book::ActiveModel {
            id: Set(record.id),
            name: Set(record.name.clone()),
            created_at: Set(record.created_at),
            archived_at: Set(record.archived_at),
            version: Set(0),
            dirty: Set(false),
            updated_at: Set(record.created_at),
        };
        if entities::Book::find_by_id(record.id)
            .one(self.conn())
            .await?
            .is_some()
        {
            entities::Book::update_many()
                .col_expr(book::Column::Name, Expr::value(record.name.clone()))
                .col_expr(book::Column::ArchivedAt, Expr::value(record.archived_at))
                .filter(book::Column::Id.eq(record.id))
                .exec(self.conn())
                .await?;
        } else {
            active.insert(self.conn()).await?;
        }
        Ok(())
    }

    pub async fn book(&self, id: Uuid) -> Result<Option<Book>, StoreError> {
        Ok(entities::Book::find_by_id(id)
            .one(self.conn())
            .await?
            .map(book_from_model))
    }

    pub async fn books(&self) -> Result<Vec<Book>, StoreError> {
        Ok(entities::Book::find()
            .order_by_asc(book::Column::CreatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(book_from_model)
            .collect())
    }

    // ---- events ----

    pub async fn put_event(&self, record: &Event) -> Result<(), StoreError> {
        let existing = entities::Event::find_by_id(record.id)
            .one(self.conn())
            .await?;
        let active = event_to_active(record);
        if existing.is_some() {
            active.update(self.conn()).await?;
        } else {
            active.insert(self.conn()).await?;
        }
        Ok(())
    }

    pub async fn event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        entities::Event::find_by_id(id)
            .one(self.conn())
            .await?
            .map(event_from_model)
            .transpose()
    }

    /// Live (not soft-removed) events of a book
    pub async fn events_for_book(&self, book_id: Uuid) -> Result<Vec<Event>, StoreError> {
        entities::Event::find()
            .filter(event::Column::BookId.eq(book_id))
            .filter(event::Column::IsRemoved.eq(false))
            .order_by_asc(event::Column::StartsAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(event_from_model)
            .collect()
    }

    pub async fn dirty_events(&self) -> Result<Vec<Event>, StoreError> {
        entities::Event::find()
            .filter(event::Column::Dirty.eq(true))
            .order_by_asc(event::Column::UpdatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(event_from_model)
            .collect()
    }

    /// Clear the dirty flag only if the record was not touched since the
    /// pushed snapshot was taken. Returns false when a concurrent local edit
    /// kept the record dirty.
    pub async fn clear_event_dirty(
        &self,
        id: Uuid,
        version: i64,
        snapshot: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = entities::Event::update_many()
            .col_expr(event::Column::Dirty, Expr::value(false))
            .col_expr(event::Column::Version, Expr::value(version))
            .filter(event::Column::Id.eq(id))
            .filter(event::Column::UpdatedAt.eq(snapshot))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    // ---- notes ----

    /// Upsert a note by its owning event. When a row already exists for the
    /// event the stored row id wins, keeping the 1:1 mapping stable.
    pub async fn put_note(&self, record: &Note) -> Result<(), StoreError> {
        let existing = entities::Note::find()
            .filter(note::Column::EventId.eq(record.event_id))
            .one(self.conn())
            .await?;

        let mut active = note_to_active(record);
        match existing {
            Some(row) => {
                active.id = Set(row.id);
                active.update(self.conn()).await?;
            }
            None => {
                active.insert(self.conn()).await?;
            }
        }
        Ok(())
    }

    pub async fn note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(entities::Note::find_by_id(id)
            .one(self.conn())
            .await?
            .map(note_from_model))
    }

    pub async fn note_by_event(&self, event_id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(entities::Note::find()
            .filter(note::Column::EventId.eq(event_id))
            .one(self.conn())
            .await?
            .map(note_from_model))
    }

    pub async fn dirty_notes(&self) -> Result<Vec<Note>, StoreError> {
        Ok(entities::Note::find()
            .filter(note::Column::Dirty.eq(true))
            .order_by_asc(note::Column::UpdatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(note_from_model)
            .collect())
    }

    /// Register a cache hit
    pub async fn touch_note(&self, event_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        entities::Note::update_many()
            .col_expr(
                note::Column::HitCount,
                Expr::col(note::Column::HitCount).add(1),
            )
            .col_expr(note::Column::CachedAt, Expr::value(now))
            .filter(note::Column::EventId.eq(event_id))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    pub async fn notes_for_person(&self, key: &PersonKey) -> Result<Vec<Note>, StoreError> {
        Ok(entities::Note::find()
            .filter(note::Column::PersonNameKey.eq(key.name_key.clone()))
            .filter(note::Column::PersonRecordKey.eq(key.record_key.clone()))
            .order_by_desc(note::Column::UpdatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(note_from_model)
            .collect())
    }

    pub async fn latest_note_for_person(
        &self,
        key: &PersonKey,
    ) -> Result<Option<Note>, StoreError> {
        Ok(entities::Note::find()
            .filter(note::Column::PersonNameKey.eq(key.name_key.clone()))
            .filter(note::Column::PersonRecordKey.eq(key.record_key.clone()))
            .order_by_desc(note::Column::UpdatedAt)
            .one(self.conn())
            .await?
            .map(note_from_model))
    }

    /// Copy converged content into a note, leaving it dirty so the next sync
    /// cycle pushes it
    pub async fn propagate_note_content(
        &self,
        note_id: Uuid,
        content: &str,
        updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        entities::Note::update_many()
            .col_expr(note::Column::Content, Expr::value(content.to_owned()))
            .col_expr(
                note::Column::ContentSize,
                Expr::value(content.len() as i64),
            )
            .col_expr(note::Column::UpdatedAt, Expr::value(updated_at))
            .col_expr(note::Column::CachedAt, Expr::value(now))
            .col_expr(note::Column::Dirty, Expr::value(true))
            .filter(note::Column::Id.eq(note_id))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    pub async fn stamp_person_key(
        &self,
        note_id: Uuid,
        key: &PersonKey,
    ) -> Result<(), StoreError> {
        entities::Note::update_many()
            .col_expr(
                note::Column::PersonNameKey,
                Expr::value(key.name_key.clone()),
            )
            .col_expr(
                note::Column::PersonRecordKey,
                Expr::value(key.record_key.clone()),
            )
            .filter(note::Column::Id.eq(note_id))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    /// Atomically take the edit lock. Succeeds when the note is unlocked,
    /// already held by this device, or the recorded lock has gone stale.
    pub async fn try_lock_note(
        &self,
        note_id: Uuid,
        device_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = entities::Note::update_many()
            .col_expr(note::Column::LockedByDevice, Expr::value(device_id))
            .col_expr(note::Column::LockedAt, Expr::value(now))
            .filter(note::Column::Id.eq(note_id))
            .filter(
                note::Column::LockedByDevice
                    .is_null()
                    .or(note::Column::LockedByDevice.eq(device_id))
                    .or(note::Column::LockedAt.lt(stale_before)),
            )
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Release the lock; only the holder may release
    pub async fn unlock_note(&self, note_id: Uuid, device_id: Uuid) -> Result<bool, StoreError> {
        let result = entities::Note::update_many()
            .col_expr(note::Column::LockedByDevice, Expr::value(None::<Uuid>))
            .col_expr(note::Column::LockedAt, Expr::value(None::<DateTime<Utc>>))
            .filter(note::Column::Id.eq(note_id))
            .filter(note::Column::LockedByDevice.eq(device_id))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Force-clear every lock older than the cutoff, regardless of holder
    pub async fn clear_stale_locks(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = entities::Note::update_many()
            .col_expr(note::Column::LockedByDevice, Expr::value(None::<Uuid>))
            .col_expr(note::Column::LockedAt, Expr::value(None::<DateTime<Utc>>))
            .filter(note::Column::LockedAt.lt(stale_before))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn clear_note_dirty(
        &self,
        note_id: Uuid,
        version: i64,
        snapshot: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = entities::Note::update_many()
            .col_expr(note::Column::Dirty, Expr::value(false))
            .col_expr(note::Column::Version, Expr::value(version))
            .filter(note::Column::Id.eq(note_id))
            .filter(note::Column::UpdatedAt.eq(snapshot))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_note(&self, note_id: Uuid) -> Result<u64, StoreError> {
        let result = entities::Note::delete_many()
            .filter(note::Column::Id.eq(note_id))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    /// Drop clean cache entries older than the cutoff
    pub async fn evict_expired_notes(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = entities::Note::delete_many()
            .filter(note::Column::Dirty.eq(false))
            .filter(note::Column::CachedAt.lt(cutoff))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    /// Drop one batch of the coldest clean entries; coldness is lowest hit
    /// count, then oldest cache stamp
    pub async fn evict_coldest_notes(&self, batch: u64) -> Result<u64, StoreError> {
        let victims: Vec<Uuid> = entities::Note::find()
            .filter(note::Column::Dirty.eq(false))
            .order_by_asc(note::Column::HitCount)
            .order_by_asc(note::Column::CachedAt)
            .limit(batch)
            .all(self.conn())
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        if victims.is_empty() {
            return Ok(0);
        }
        let result = entities::Note::delete_many()
            .filter(note::Column::Id.is_in(victims))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn notes_cached_size(&self) -> Result<i64, StoreError> {
        let row = entities::Note::find()
            .select_only()
            .column_as(note::Column::ContentSize.sum(), "total")
            .into_model::<SumRow>()
            .one(self.conn())
            .await?;
        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    // ---- drawings ----

    /// Upsert a drawing by its page key (book, date, view mode)
    pub async fn put_drawing(&self, record: &ScheduleDrawing) -> Result<(), StoreError> {
        let existing = entities::Drawing::find()
            .filter(drawing::Column::BookId.eq(record.book_id))
            .filter(drawing::Column::EffectiveDate.eq(record.effective_date))
            .filter(drawing::Column::ViewMode.eq(record.view_mode.to_string()))
            .one(self.conn())
            .await?;

        let mut active = drawing_to_active(record)?;
        match existing {
            Some(row) => {
                active.id = Set(row.id);
                active.update(self.conn()).await?;
            }
            None => {
                active.insert(self.conn()).await?;
            }
        }
        Ok(())
    }

    pub async fn drawing(&self, id: Uuid) -> Result<Option<ScheduleDrawing>, StoreError> {
        entities::Drawing::find_by_id(id)
            .one(self.conn())
            .await?
            .map(drawing_from_model)
            .transpose()
    }

    pub async fn drawing_for_page(
        &self,
        book_id: Uuid,
        date: NaiveDate,
        view_mode: ViewMode,
    ) -> Result<Option<ScheduleDrawing>, StoreError> {
        entities::Drawing::find()
            .filter(drawing::Column::BookId.eq(book_id))
            .filter(drawing::Column::EffectiveDate.eq(date))
            .filter(drawing::Column::ViewMode.eq(view_mode.to_string()))
            .one(self.conn())
            .await?
            .map(drawing_from_model)
            .transpose()
    }

    pub async fn dirty_drawings(&self) -> Result<Vec<ScheduleDrawing>, StoreError> {
        entities::Drawing::find()
            .filter(drawing::Column::Dirty.eq(true))
            .order_by_asc(drawing::Column::UpdatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(drawing_from_model)
            .collect()
    }

    pub async fn touch_drawing(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        entities::Drawing::update_many()
            .col_expr(
                drawing::Column::HitCount,
                Expr::col(drawing::Column::HitCount).add(1),
            )
            .col_expr(drawing::Column::CachedAt, Expr::value(now))
            .filter(drawing::Column::Id.eq(id))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    pub async fn clear_drawing_dirty(
        &self,
        id: Uuid,
        version: i64,
        snapshot: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = entities::Drawing::update_many()
            .col_expr(drawing::Column::Dirty, Expr::value(false))
            .col_expr(drawing::Column::Version, Expr::value(version))
            .filter(drawing::Column::Id.eq(id))
            .filter(drawing::Column::UpdatedAt.eq(snapshot))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_drawing(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = entities::Drawing::delete_many()
            .filter(drawing::Column::Id.eq(id))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn evict_expired_drawings(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = entities::Drawing::delete_many()
            .filter(drawing::Column::Dirty.eq(false))
            .filter(drawing::Column::CachedAt.lt(cutoff))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn evict_coldest_drawings(&self, batch: u64) -> Result<u64, StoreError> {
        let victims: Vec<Uuid> = entities::Drawing::find()
            .filter(drawing::Column::Dirty.eq(false))
            .order_by_asc(drawing::Column::HitCount)
            .order_by_asc(drawing::Column::CachedAt)
            .limit(batch)
            .all(self.conn())
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        if victims.is_empty() {
            return Ok(0);
        }
        let result = entities::Drawing::delete_many()
            .filter(drawing::Column::Id.is_in(victims))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn drawings_cached_size(&self) -> Result<i64, StoreError> {
        let row = entities::Drawing::find()
            .select_only()
            .column_as(drawing::Column::ContentSize.sum(), "total")
            .into_model::<SumRow>()
            .one(self.conn())
            .await?;
        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    // ---- cache policy & sync cursor ----

    pub async fn cache_policy(&self) -> Result<CachePolicy, StoreError> {
        let row = entities::CachePolicyRow::find_by_id(cache_policy::SINGLETON_ID)
            .one(self.conn())
            .await?;
        Ok(match row {
            Some(m) => CachePolicy {
                max_cache_size_mb: m.max_cache_size_mb,
                cache_duration_days: m.cache_duration_days,
                auto_cleanup: m.auto_cleanup,
                last_cleanup_at: m.last_cleanup_at,
            },
            None => CachePolicy::default(),
        })
    }

    pub async fn set_cache_policy(&self, policy: &CachePolicy) -> Result<(), StoreError> {
        entities::CachePolicyRow::update_many()
            .col_expr(
                cache_policy::Column::MaxCacheSizeMb,
                Expr::value(policy.max_cache_size_mb),
            )
            .col_expr(
                cache_policy::Column::CacheDurationDays,
                Expr::value(policy.cache_duration_days),
            )
            .col_expr(
                cache_policy::Column::AutoCleanup,
                Expr::value(policy.auto_cleanup),
            )
            .col_expr(
                cache_policy::Column::LastCleanupAt,
                Expr::value(policy.last_cleanup_at),
            )
            .filter(cache_policy::Column::Id.eq(cache_policy::SINGLETON_ID))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    pub async fn stamp_cleanup(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        entities::CachePolicyRow::update_many()
            .col_expr(cache_policy::Column::LastCleanupAt, Expr::value(now))
            .filter(cache_policy::Column::Id.eq(cache_policy::SINGLETON_ID))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(entities::SyncStateRow::find_by_id(sync_state::SINGLETON_ID)
            .one(self.conn())
            .await?
            .and_then(|m| m.last_sync_at))
    }

    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        entities::SyncStateRow::update_many()
            .col_expr(sync_state::Column::LastSyncAt, Expr::value(at))
            .filter(sync_state::Column::Id.eq(sync_state::SINGLETON_ID))
            .exec(self.conn())
            .await?;
        Ok(())
    }
}

// ---- model <-> domain conversions ----

fn book_from_model(m: book::Model) -> Book {
    Book {
        id: m.id,
        name: m.name,
        created_at: m.created_at,
        archived_at: m.archived_at,
    }
}

fn event_from_model(m: event::Model) -> Result<Event, StoreError> {
    let kind = m
        .kind
        .parse::<EventKind>()
        .map_err(|_| StoreError::InvalidField {
            field: "kind",
            value: m.kind.clone(),
        })?;
    Ok(Event {
        id: m.id,
        book_id: m.book_id,
        title: m.title,
        starts_at: m.starts_at,
        ends_at: m.ends_at,
        record_number: m.record_number,
        kind,
        is_removed: m.is_removed,
        removal_reason: m.removal_reason,
        original_event_id: m.original_event_id,
        new_event_id: m.new_event_id,
        version: m.version,
        dirty: m.dirty,
        updated_at: m.updated_at,
    })
}

fn event_to_active(record: &Event) -> event::ActiveModel {
    event::ActiveModel {
        id: Set(record.id),
        book_id: Set(record.book_id),
        title: Set(record.title.clone()),
        starts_at: Set(record.starts_at),
        ends_at: Set(record.ends_at),
        record_number: Set(record.record_number.clone()),
        kind: Set(record.kind.to_string()),
        is_removed: Set(record.is_removed),
        removal_reason: Set(record.removal_reason.clone()),
        original_event_id: Set(record.original_event_id),
        new_event_id: Set(record.new_event_id),
        version: Set(record.version),
        dirty: Set(record.dirty),
        updated_at: Set(record.updated_at),
    }
}

fn note_from_model(m: note::Model) -> Note {
    let person_key = match (m.person_name_key, m.person_record_key) {
        (Some(name_key), Some(record_key)) => Some(PersonKey {
            name_key,
            record_key,
        }),
        _ => None,
    };
    Note {
        id: m.id,
        event_id: m.event_id,
        content: m.content,
        version: m.version,
        dirty: m.dirty,
        updated_at: m.updated_at,
        cached_at: m.cached_at,
        hit_count: m.hit_count,
        person_key,
        locked_by_device: m.locked_by_device,
        locked_at: m.locked_at,
    }
}

fn note_to_active(record: &Note) -> note::ActiveModel {
    note::ActiveModel {
        id: Set(record.id),
        event_id: Set(record.event_id),
        content: Set(record.content.clone()),
        version: Set(record.version),
        dirty: Set(record.dirty),
        updated_at: Set(record.updated_at),
        cached_at: Set(record.cached_at),
        hit_count: Set(record.hit_count),
        content_size: Set(record.content.len() as i64),
        person_name_key: Set(record.person_key.as_ref().map(|k| k.name_key.clone())),
        person_record_key: Set(record.person_key.as_ref().map(|k| k.record_key.clone())),
        locked_by_device: Set(record.locked_by_device),
        locked_at: Set(record.locked_at),
    }
}

fn drawing_from_model(m: drawing::Model) -> Result<ScheduleDrawing, StoreError> {
    let view_mode = m
        .view_mode
        .parse::<ViewMode>()
        .map_err(|_| StoreError::InvalidField {
            field: "view_mode",
            value: m.view_mode.clone(),
        })?;
    let strokes: Vec<Stroke> = serde_json::from_str(&m.content)?;
    Ok(ScheduleDrawing {
        id: m.id,
        book_id: m.book_id,
        effective_date: m.effective_date,
        view_mode,
        strokes,
        version: m.version,
        dirty: m.dirty,
        updated_at: m.updated_at,
        cached_at: m.cached_at,
        hit_count: m.hit_count,
    })
}

fn drawing_to_active(record: &ScheduleDrawing) -> Result<drawing::ActiveModel, StoreError> {
    let content = serde_json::to_string(&record.strokes)?;
    Ok(drawing::ActiveModel {
        id: Set(record.id),
        book_id: Set(record.book_id),
        effective_date: Set(record.effective_date),
        view_mode: Set(record.view_mode.to_string()),
        content_size: Set(content.len() as i64),
        content: Set(content),
        version: Set(record.version),
        dirty: Set(record.dirty),
        updated_at: Set(record.updated_at),
        cached_at: Set(record.cached_at),
        hit_count: Set(record.hit_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> LocalStore {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        LocalStore::new(Arc::new(db))
    }

    fn fixture_event(store_now: DateTime<Utc>, book_id: Uuid) -> Event {
        Event::new(
            book_id,
            "Jane Doe".into(),
            store_now,
            store_now + Duration::hours(1),
            store_now,
        )
    }

    #[tokio::test]
    async fn note_roundtrip_keeps_person_key_and_lock() {
        let store = store().await;
        let now = Utc::now();
        let book = Book::new("clinic".into(), now);
        store.put_book(&book).await.unwrap();
        let event = fixture_event(now, book.id);
        store.put_event(&event).await.unwrap();

        let mut note = Note::new(event.id, "ink".into(), now);
        note.person_key = PersonKey::new("Jane Doe", "REC1");
        note.locked_by_device = Some(Uuid::new_v4());
        note.locked_at = Some(now);
        store.put_note(&note).await.unwrap();

        let loaded = store.note_by_event(event.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "ink");
        assert_eq!(loaded.person_key, PersonKey::new("Jane Doe", "REC1"));
        assert_eq!(loaded.locked_by_device, note.locked_by_device);
        assert_eq!(loaded.content_size(), 3);
    }

    #[tokio::test]
    async fn put_note_by_event_keeps_stored_row_id() {
        let store = store().await;
        let now = Utc::now();
        let book = Book::new("clinic".into(), now);
        store.put_book(&book).await.unwrap();
        let event = fixture_event(now, book.id);
        store.put_event(&event).await.unwrap();

        let first = Note::new(event.id, "one".into(), now);
        store.put_note(&first).await.unwrap();

        // A second put for the same event carries a fresh domain id
        let second = Note::new(event.id, "two".into(), now);
        store.put_note(&second).await.unwrap();

        let loaded = store.note_by_event(event.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, first.id);
        assert_eq!(loaded.content, "two");
    }

    #[tokio::test]
    async fn clear_note_dirty_is_guarded_by_snapshot() {
        let store = store().await;
        let now = Utc::now();
        let book = Book::new("clinic".into(), now);
        store.put_book(&book).await.unwrap();
        let event = fixture_event(now, book.id);
        store.put_event(&event).await.unwrap();

        let note = Note::new(event.id, "ink".into(), now);
        store.put_note(&note).await.unwrap();

        // A concurrent edit moved updated_at; the stale snapshot must not clear
        let stale = now - Duration::seconds(30);
        assert!(!store.clear_note_dirty(note.id, 1, stale).await.unwrap());
        assert!(store
            .note_by_event(event.id)
            .await
            .unwrap()
            .unwrap()
            .dirty);

        assert!(store.clear_note_dirty(note.id, 1, now).await.unwrap());
        let synced = store.note_by_event(event.id).await.unwrap().unwrap();
        assert!(!synced.dirty);
        assert_eq!(synced.version, 1);
    }

    #[tokio::test]
    async fn eviction_skips_dirty_entries() {
        let store = store().await;
        let now = Utc::now();
        let book = Book::new("clinic".into(), now);
        store.put_book(&book).await.unwrap();

        let event_a = fixture_event(now, book.id);
        let event_b = fixture_event(now, book.id);
        store.put_event(&event_a).await.unwrap();
        store.put_event(&event_b).await.unwrap();

        let mut clean = Note::new(event_a.id, "old clean".into(), now);
        clean.dirty = false;
        clean.cached_at = now - Duration::days(120);
        store.put_note(&clean).await.unwrap();

        let mut dirty = Note::new(event_b.id, "old dirty".into(), now);
        dirty.cached_at = now - Duration::days(120);
        store.put_note(&dirty).await.unwrap();

        let removed = store
            .evict_expired_notes(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.note_by_event(event_a.id).await.unwrap().is_none());
        assert!(store.note_by_event(event_b.id).await.unwrap().is_some());
    }
}
