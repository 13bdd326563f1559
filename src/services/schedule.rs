//! Schedule maintenance - event lifecycle operations
//!
//! Time changes never mutate an event in place: rescheduling soft-removes
//! the original and creates a new linked event, carrying the note along, so
//! the full history stays in the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Event, Note};
use crate::infrastructure::database::{LocalStore, StoreError};
use crate::services::person::PersonSharing;
use crate::shared::Clock;

/// Schedule operation failures
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("event {0} not found")]
	NotFound(Uuid),

	#[error("event {0} is removed")]
	Removed(Uuid),
}

/// Event lifecycle operations
pub struct ScheduleService {
	store: Arc<LocalStore>,
	persons: Arc<PersonSharing>,
	clock: Arc<dyn Clock>,
}

impl ScheduleService {
	pub fn new(store: Arc<LocalStore>, persons: Arc<PersonSharing>, clock: Arc<dyn Clock>) -> Self {
		Self {
			store,
			persons,
			clock,
		}
	}

	pub async fn create_event(
		&self,
		book_id: Uuid,
		title: String,
		starts_at: DateTime<Utc>,
		ends_at: DateTime<Utc>,
	) -> Result<Event, ScheduleError> {
		let event = Event::new(book_id, title, starts_at, ends_at, self.clock.now());
		self.store.put_event(&event).await?;
		Ok(event)
	}

	/// Soft-remove: the record stays in the store with the reason attached
	#[instrument(skip(self))]
	pub async fn remove_event(&self, event_id: Uuid, reason: String) -> Result<Event, ScheduleError> {
		let mut event = self
			.store
			.event(event_id)
			.await?
			.ok_or(ScheduleError::NotFound(event_id))?;

		event.is_removed = true;
		event.removal_reason = Some(reason);
		event.dirty = true;
		event.updated_at = self.clock.now();
		self.store.put_event(&event).await?;
		Ok(event)
	}

	/// Reschedule by replacement: soft-remove the original, create a new
	/// event linked both ways, and copy the note onto the replacement
	#[instrument(skip(self))]
	pub async fn reschedule(
		&self,
		event_id: Uuid,
		new_starts_at: DateTime<Utc>,
		new_ends_at: DateTime<Utc>,
	) -> Result<Event, ScheduleError> {
		let mut original = self
			.store
			.event(event_id)
			.await?
			.ok_or(ScheduleError::NotFound(event_id))?;
		if original.is_removed {
			return Err(ScheduleError::Removed(event_id));
		}

		let now = self.clock.now();
		let mut replacement = Event::new(
			original.book_id,
			original.title.clone(),
			new_starts_at,
			new_ends_at,
			now,
		);
		replacement.record_number = original.record_number.clone();
		replacement.kind = original.kind;
		replacement.original_event_id = Some(original.id);

		original.is_removed = true;
		original.removal_reason = Some("rescheduled".to_string());
		original.new_event_id = Some(replacement.id);
		original.dirty = true;
		original.updated_at = now;

		self.store.put_event(&original).await?;
		self.store.put_event(&replacement).await?;

		// Carry the handwriting over to the replacement
		if let Some(note) = self.store.note_by_event(original.id).await? {
			let mut copy = Note::new(replacement.id, note.content.clone(), now);
			copy.person_key = note.person_key.clone();
			self.store.put_note(&copy).await?;
		}

		info!(original = %original.id, replacement = %replacement.id, "event rescheduled");
		Ok(replacement)
	}

	/// Persist a record-number change; an empty-to-populated transition is
	/// the moment the note may join a person group
	#[instrument(skip(self))]
	pub async fn update_record_number(
		&self,
		event_id: Uuid,
		record_number: String,
	) -> Result<Event, ScheduleError> {
		let mut event = self
			.store
			.event(event_id)
			.await?
			.ok_or(ScheduleError::NotFound(event_id))?;

		let was_empty = event.record_number().is_none();
		event.record_number = Some(record_number);
		event.dirty = true;
		event.updated_at = self.clock.now();
		self.store.put_event(&event).await?;

		if was_empty && event.record_number().is_some() {
			self.persons.handle_record_number_update(&event).await?;
		}
		Ok(event)
	}
}
