//! Person sharing and lock subsystem
//!
//! Notes that belong to the same real-world person (same PersonKey) across
//! multiple events converge to identical content: reads adopt the newest
//! group member, writes propagate to every unlocked member. A per-note
//! device lock with a stale timeout keeps two devices from editing the same
//! note at once without ever locking anyone out permanently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::device::DeviceManager;
use crate::domain::{Event, Note, PersonKey};
use crate::infrastructure::database::{LocalStore, StoreError};
use crate::shared::{Clock, SaveQueue, SaveQueueClosed};

/// A lock older than this is stale; a crashed or disconnected holder must
/// never cause a permanent lockout
const LOCK_TIMEOUT_SECS: i64 = 5 * 60;

/// Person sharing failures
#[derive(Debug, thiserror::Error)]
pub enum SharingError {
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	QueueClosed(#[from] SaveQueueClosed),
}

/// Cross-record convergence and per-record mutual exclusion
pub struct PersonSharing {
	store: Arc<LocalStore>,
	device: Arc<DeviceManager>,
	clock: Arc<dyn Clock>,
	queue: Arc<SaveQueue>,
	is_sweeping: AtomicBool,
}

impl PersonSharing {
	pub fn new(
		store: Arc<LocalStore>,
		device: Arc<DeviceManager>,
		clock: Arc<dyn Clock>,
		queue: Arc<SaveQueue>,
	) -> Self {
		Self {
			store,
			device,
			clock,
			queue,
			is_sweeping: AtomicBool::new(false),
		}
	}

	/// Start the periodic stale-lock sweep
	pub fn start_lock_sweep(self: &Arc<Self>, every: std::time::Duration) {
		if self.is_sweeping.swap(true, Ordering::AcqRel) {
			warn!("stale-lock sweep already running");
			return;
		}

		let persons = self.clone();
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(every);
			while persons.is_sweeping.load(Ordering::Acquire) {
				interval.tick().await;
				if let Err(e) = persons.cleanup_stale_locks().await {
					warn!("stale-lock sweep failed: {e}");
				}
			}
		});
	}

	pub fn stop_lock_sweep(&self) {
		self.is_sweeping.store(false, Ordering::Release);
	}

	fn lock_timeout(&self) -> Duration {
		Duration::seconds(LOCK_TIMEOUT_SECS)
	}

	/// Read-time convergence: return the event's note, first adopting the
	/// newest content in its person group when that is strictly newer
	#[instrument(skip(self, event), fields(event_id = %event.id))]
	pub async fn load_for_event(&self, event: &Event) -> Result<Option<Note>, StoreError> {
		let own = self.store.note_by_event(event.id).await?;

		let Some(key) = PersonKey::for_event(event) else {
			return Ok(own);
		};

		let newest = self.store.latest_note_for_person(&key).await?;
		let now = self.clock.now();

		match (own, newest) {
			(Some(own), Some(newest))
				if newest.id != own.id && newest.updated_at > own.updated_at =>
			{
				debug!(source = %newest.event_id, "adopting newer person-group content");
				self.store
					.propagate_note_content(own.id, &newest.content, newest.updated_at, now)
					.await?;
				self.store.stamp_person_key(own.id, &key).await?;
				self.store.note_by_event(event.id).await
			}
			(Some(own), _) => {
				if own.person_key.as_ref() != Some(&key) {
					self.store.stamp_person_key(own.id, &key).await?;
				}
				self.store.note_by_event(event.id).await
			}
			(None, Some(newest)) => {
				debug!(source = %newest.event_id, "materializing note from person group");
				let mut note = Note::new(event.id, newest.content.clone(), now);
				note.updated_at = newest.updated_at;
				note.person_key = Some(key);
				self.store.put_note(&note).await?;
				self.store.note_by_event(event.id).await
			}
			(None, None) => Ok(None),
		}
	}

	/// Persist the note for this event and propagate its content to every
	/// other unlocked member of the person group. Always releases any lock
	/// this device held on the saved note.
	#[instrument(skip(self, note), fields(event_id = %event.id))]
	pub async fn save_with_sync(&self, event: &Event, note: Note) -> Result<Note, SharingError> {
		let store = self.store.clone();
		let device_id = self.device.device_id();
		let key = PersonKey::for_event(event);
		let lock_timeout = self.lock_timeout();
		let now = self.clock.now();
		let event_id = event.id;

		let saved = self
			.queue
			.run(format!("note:{event_id}"), async move {
				let mut note = note;
				note.event_id = event_id;
				note.dirty = true;
				note.updated_at = now;
				note.cached_at = now;
				note.person_key = key.clone();
				store.put_note(&note).await?;
				// The row id may differ from the incoming domain id
				let saved = store
					.note_by_event(event_id)
					.await?
					.unwrap_or(note);

				if let Some(key) = key {
					let stale_before = now - lock_timeout;
					for member in store.notes_for_person(&key).await? {
						if member.id == saved.id {
							continue;
						}
						if live_lock_holder(&member, stale_before).is_some_and(|d| d != device_id) {
							// Holder is actively editing; skip it
							debug!(note_id = %member.id, "skipping locked group member");
							continue;
						}
						store
							.propagate_note_content(
								member.id,
								&saved.content,
								saved.updated_at,
								now,
							)
							.await?;
					}
				}

				// Saving ends this device's editing session
				store.unlock_note(saved.id, device_id).await?;
				store.note_by_event(event_id).await.map(|n| n.unwrap_or(saved))
			})
			.await??;

		Ok(saved)
	}

	/// Take the edit lock. Succeeds when the note is unlocked, already held
	/// by this device, or the recorded lock has gone stale.
	pub async fn acquire_lock(&self, note_id: Uuid) -> Result<bool, StoreError> {
		let now = self.clock.now();
		let acquired = self
			.store
			.try_lock_note(
				note_id,
				self.device.device_id(),
				now,
				now - self.lock_timeout(),
			)
			.await?;
		if !acquired {
			debug!(%note_id, "lock held by another device");
		}
		Ok(acquired)
	}

	/// Release the lock; only the holder may release
	pub async fn release_lock(&self, note_id: Uuid) -> Result<bool, StoreError> {
		self.store
			.unlock_note(note_id, self.device.device_id())
			.await
	}

	/// The gate callers must check before permitting an edit. Unlocked,
	/// self-locked and stale locks all return false.
	pub fn is_locked_by_other(&self, note: &Note) -> bool {
		let stale_before = self.clock.now() - self.lock_timeout();
		live_lock_holder(note, stale_before).is_some_and(|holder| holder != self.device.device_id())
	}

	/// Periodic sweep force-clearing any lock older than the timeout,
	/// regardless of holder
	pub async fn cleanup_stale_locks(&self) -> Result<u64, StoreError> {
		let cleared = self
			.store
			.clear_stale_locks(self.clock.now() - self.lock_timeout())
			.await?;
		if cleared > 0 {
			info!(cleared, "cleared stale note locks");
		}
		Ok(cleared)
	}

	/// Fired when an event's record number transitions from empty to
	/// populated: the moment two independently created notes can discover
	/// they belong to the same person.
	#[instrument(skip(self, event), fields(event_id = %event.id))]
	pub async fn handle_record_number_update(&self, event: &Event) -> Result<(), StoreError> {
		let Some(key) = PersonKey::for_event(event) else {
			warn!("record number update without a usable person key");
			return Ok(());
		};

		let own = self.store.note_by_event(event.id).await?;
		let now = self.clock.now();

		// Newest group member with real content, excluding our own note
		let donor = self
			.store
			.notes_for_person(&key)
			.await?
			.into_iter()
			.filter(|n| own.as_ref().map(|o| o.id) != Some(n.id))
			.find(|n| n.has_content());

		match (donor, own) {
			// Adopt existing person-group content
			(Some(donor), Some(own)) => {
				debug!(source = %donor.event_id, "adopting person-group content");
				self.store
					.propagate_note_content(own.id, &donor.content, donor.updated_at, now)
					.await?;
				self.store.stamp_person_key(own.id, &key).await?;
			}
			(Some(donor), None) => {
				let mut note = Note::new(event.id, donor.content.clone(), now);
				note.updated_at = donor.updated_at;
				note.person_key = Some(key);
				self.store.put_note(&note).await?;
			}
			// Promote our own content into the group, or just join it
			(None, Some(own)) => {
				self.store.stamp_person_key(own.id, &key).await?;
			}
			(None, None) => {
				let mut note = Note::new(event.id, String::new(), now);
				note.person_key = Some(key);
				self.store.put_note(&note).await?;
			}
		}
		Ok(())
	}
}

/// The holder of a live (non-stale) lock on this note, if any
fn live_lock_holder(note: &Note, stale_before: chrono::DateTime<chrono::Utc>) -> Option<Uuid> {
	match (note.locked_by_device, note.locked_at) {
		(Some(holder), Some(at)) if at >= stale_before => Some(holder),
		_ => None,
	}
}
