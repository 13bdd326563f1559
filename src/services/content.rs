//! Content Access Service - cache-first get/save orchestration
//!
//! Reads hit the local store first and only touch the network on a miss or
//! a forced refresh; every remote failure falls back to the cache before
//! giving up. Saves are local-first and return without any network wait;
//! pushing is a separate, explicitly invoked operation.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::device::DeviceManager;
use crate::domain::{merge_strokes, Note, ScheduleDrawing, Stroke, ViewMode};
use crate::infrastructure::database::{LocalStore, StoreError};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::remote::{DrawingPayload, NotePayload, RemoteApi, RemoteError};
use crate::services::cache::CacheManager;
use crate::shared::{Clock, GenerationCounter, SaveQueue, SaveQueueClosed};

/// Keys are fetched in batches of this many during preload
const PRELOAD_BATCH: usize = 50;

/// Bounded attempts for the drawing conflict merge-retry
const MAX_CONFLICT_ATTEMPTS: u32 = 3;

/// Cache key of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteKey {
	pub book_id: Uuid,
	pub event_id: Uuid,
}

/// Cache key of a schedule drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingKey {
	pub book_id: Uuid,
	pub date: NaiveDate,
	pub view_mode: ViewMode,
}

impl DrawingKey {
	fn queue_resource(&self) -> String {
		format!("drawing:{}:{}:{}", self.book_id, self.date, self.view_mode)
	}
}

/// Content access failures
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Remote(#[from] RemoteError),

	#[error("no local copy of {0}")]
	Missing(String),

	#[error(transparent)]
	QueueClosed(#[from] SaveQueueClosed),
}

/// Cache-first access to note and drawing content
pub struct ContentService {
	store: Arc<LocalStore>,
	remote: Arc<dyn RemoteApi>,
	device: Arc<DeviceManager>,
	cache: Arc<CacheManager>,
	queue: Arc<SaveQueue>,
	clock: Arc<dyn Clock>,
	events: Arc<EventBus>,
}

impl ContentService {
	pub fn new(
		store: Arc<LocalStore>,
		remote: Arc<dyn RemoteApi>,
		device: Arc<DeviceManager>,
		cache: Arc<CacheManager>,
		queue: Arc<SaveQueue>,
		clock: Arc<dyn Clock>,
		events: Arc<EventBus>,
	) -> Self {
		Self {
			store,
			remote,
			device,
			cache,
			queue,
			clock,
			events,
		}
	}

	// ---- notes ----

	/// Cache-first read. A hit returns immediately with no network wait and
	/// registers on the hit counter; a miss (or forced refresh) goes remote
	/// with the cache as the fallback for every failure mode.
	#[instrument(skip(self), fields(event_id = %key.event_id))]
	pub async fn get_note(
		&self,
		key: NoteKey,
		force_refresh: bool,
	) -> Result<Option<Note>, StoreError> {
		if !force_refresh {
			if let Some(mut note) = self.store.note_by_event(key.event_id).await? {
				let now = self.clock.now();
				self.store.touch_note(key.event_id, now).await?;
				note.hit_count += 1;
				note.cached_at = now;
				return Ok(Some(note));
			}
		}

		let Some(credentials) = self.device.credentials() else {
			// Unregistered: cache is all there is
			return self.store.note_by_event(key.event_id).await;
		};

		match self
			.remote
			.fetch_note(&credentials, key.book_id, key.event_id)
			.await
		{
			Ok(Some(payload)) => {
				if let Some(local) = self.store.note_by_event(key.event_id).await? {
					if local.dirty {
						// A pending local edit outranks the server copy
						debug!("skipping remote fill over dirty local note");
						return Ok(Some(local));
					}
				}
				self.store
					.put_note(&self.note_from_payload(payload))
					.await?;
				if let Err(e) = self.cache.enforce_budget().await {
					warn!("cache budget enforcement failed: {e}");
				}
				self.store.note_by_event(key.event_id).await
			}
			Ok(None) => self.store.note_by_event(key.event_id).await,
			Err(e) => {
				warn!("note fetch failed, falling back to cache: {e}");
				self.store.note_by_event(key.event_id).await
			}
		}
	}

	/// Local-first write: durable immediately, stamped dirty, no network
	#[instrument(skip(self, note), fields(event_id = %key.event_id))]
	pub async fn save_note(&self, key: NoteKey, note: Note) -> Result<Note, ContentError> {
		let store = self.store.clone();
		let now = self.clock.now();
		let event_id = key.event_id;

		let saved = self
			.queue
			.run(format!("note:{event_id}"), async move {
				let mut note = note;
				note.event_id = event_id;
				note.dirty = true;
				note.updated_at = now;
				note.cached_at = now;
				store.put_note(&note).await?;
				store
					.note_by_event(event_id)
					.await
					.map(|stored| stored.unwrap_or(note))
			})
			.await??;

		if let Err(e) = self.cache.enforce_budget().await {
			warn!("cache budget enforcement failed: {e}");
		}
		Ok(saved)
	}

	/// Push one note to the remote store. Requires credentials; a 200 clears
	/// the dirty flag atomically with adopting the server version, anything
	/// else keeps the record dirty.
	#[instrument(skip(self), fields(event_id = %key.event_id))]
	pub async fn sync_note(&self, key: NoteKey) -> Result<Note, ContentError> {
		let credentials = self
			.device
			.credentials()
			.ok_or(RemoteError::NotRegistered)?;
		let note = self
			.store
			.note_by_event(key.event_id)
			.await?
			.ok_or_else(|| ContentError::Missing(format!("note for event {}", key.event_id)))?;

		let saved = self
			.remote
			.push_note(&credentials, key.book_id, &NotePayload::from(&note))
			.await?;

		if !self
			.store
			.clear_note_dirty(note.id, saved.version, note.updated_at)
			.await?
		{
			debug!("note changed during push, staying dirty");
		}
		self.store
			.note_by_event(key.event_id)
			.await?
			.ok_or_else(|| ContentError::Missing(format!("note for event {}", key.event_id)))
	}

	/// Best-effort warm-up of a window of notes. Individual failures are
	/// logged and skipped; a stale generation stops the walk. Returns
	/// (loaded, total).
	#[instrument(skip(self, keys, generation))]
	pub async fn preload_notes(
		&self,
		book_id: Uuid,
		keys: Vec<NoteKey>,
		generation: &GenerationCounter,
	) -> (usize, usize) {
		let captured = generation.current();
		let total = keys.len();
		let mut loaded = 0usize;

		let credentials = self.device.credentials();

		for chunk in keys.chunks(PRELOAD_BATCH) {
			if !generation.is_current(captured) {
				debug!("preload superseded, stopping");
				break;
			}

			for key in chunk {
				match self.store.note_by_event(key.event_id).await {
					Ok(Some(_)) => {
						loaded += 1;
						continue;
					}
					Ok(None) => {}
					Err(e) => {
						warn!("preload cache probe failed: {e}");
						continue;
					}
				}

				let Some(credentials) = credentials.as_ref() else {
					continue;
				};
				match self
					.remote
					.fetch_note(credentials, key.book_id, key.event_id)
					.await
				{
					Ok(Some(payload)) => {
						let note = self.note_from_payload(payload);
						if let Err(e) = self.store.put_note(&note).await {
							warn!("preload write failed: {e}");
							continue;
						}
						loaded += 1;
					}
					Ok(None) => {}
					Err(e) => {
						warn!(event_id = %key.event_id, "preload fetch failed: {e}");
					}
				}
			}

			if let Err(e) = self.cache.enforce_budget().await {
				warn!("cache budget enforcement failed: {e}");
			}
			self.events.emit(Event::PreloadProgress {
				book_id,
				loaded,
				total,
			});
		}

		(loaded, total)
	}

	// ---- drawings ----

	/// Cache-first read of a page overlay; same fallback ladder as notes
	#[instrument(skip(self), fields(book_id = %key.book_id, date = %key.date))]
	pub async fn get_drawing(
		&self,
		key: DrawingKey,
		force_refresh: bool,
	) -> Result<Option<ScheduleDrawing>, StoreError> {
		if !force_refresh {
			if let Some(mut drawing) = self
				.store
				.drawing_for_page(key.book_id, key.date, key.view_mode)
				.await?
			{
				let now = self.clock.now();
				self.store.touch_drawing(drawing.id, now).await?;
				drawing.hit_count += 1;
				drawing.cached_at = now;
				return Ok(Some(drawing));
			}
		}

		let Some(credentials) = self.device.credentials() else {
			return self
				.store
				.drawing_for_page(key.book_id, key.date, key.view_mode)
				.await;
		};

		match self
			.remote
			.fetch_drawing(&credentials, key.book_id, key.date, key.view_mode)
			.await
		{
			Ok(Some(payload)) => {
				if let Some(local) = self
					.store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await?
				{
					if local.dirty {
						debug!("skipping remote fill over dirty local drawing");
						return Ok(Some(local));
					}
				}
				self.store
					.put_drawing(&self.drawing_from_payload(payload))
					.await?;
				if let Err(e) = self.cache.enforce_budget().await {
					warn!("cache budget enforcement failed: {e}");
				}
				self.store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await
			}
			Ok(None) => {
				self.store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await
			}
			Err(e) => {
				warn!("drawing fetch failed, falling back to cache: {e}");
				self.store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await
			}
		}
	}

	/// Page-scoped load that discards its result when the page generation
	/// has moved on by the time it resolves
	pub async fn load_drawing_for_page(
		&self,
		key: DrawingKey,
		generation: &GenerationCounter,
	) -> Result<Option<ScheduleDrawing>, StoreError> {
		let captured = generation.current();
		let result = self.get_drawing(key, false).await?;
		if !generation.is_current(captured) {
			debug!("drawing load superseded, discarding result");
			return Ok(None);
		}
		Ok(result)
	}

	/// Local-first write of a page overlay, serialized per page
	#[instrument(skip(self, strokes), fields(book_id = %key.book_id, date = %key.date))]
	pub async fn save_drawing(
		&self,
		key: DrawingKey,
		strokes: Vec<Stroke>,
	) -> Result<ScheduleDrawing, ContentError> {
		let store = self.store.clone();
		let now = self.clock.now();

		let saved = self
			.queue
			.run(key.queue_resource(), async move {
				let mut drawing = match store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await?
				{
					Some(existing) => existing,
					None => ScheduleDrawing::new(key.book_id, key.date, key.view_mode, Vec::new(), now),
				};
				drawing.strokes = strokes;
				drawing.dirty = true;
				drawing.updated_at = now;
				drawing.cached_at = now;
				store.put_drawing(&drawing).await?;
				store
					.drawing_for_page(key.book_id, key.date, key.view_mode)
					.await
					.map(|stored| stored.unwrap_or(drawing))
			})
			.await??;

		if let Err(e) = self.cache.enforce_budget().await {
			warn!("cache budget enforcement failed: {e}");
		}
		Ok(saved)
	}

	/// Push one drawing. A version conflict fetches the authoritative server
	/// copy, append-merges strokes (server first, deduplicated by stroke id)
	/// and retries with the server version, bounded to three attempts.
	#[instrument(skip(self), fields(book_id = %key.book_id, date = %key.date))]
	pub async fn sync_drawing(&self, key: DrawingKey) -> Result<ScheduleDrawing, ContentError> {
		let credentials = self
			.device
			.credentials()
			.ok_or(RemoteError::NotRegistered)?;
		let mut drawing = self
			.store
			.drawing_for_page(key.book_id, key.date, key.view_mode)
			.await?
			.ok_or_else(|| {
				ContentError::Missing(format!("drawing {}/{}", key.date, key.view_mode))
			})?;

		let mut attempts = 0u32;
		loop {
			attempts += 1;
			let snapshot = drawing.updated_at;
			match self
				.remote
				.push_drawing(&credentials, &DrawingPayload::from(&drawing))
				.await
			{
				Ok(saved) => {
					if !self
						.store
						.clear_drawing_dirty(drawing.id, saved.version, snapshot)
						.await?
					{
						debug!("drawing changed during push, staying dirty");
					}
					return self
						.store
						.drawing_for_page(key.book_id, key.date, key.view_mode)
						.await?
						.ok_or_else(|| {
							ContentError::Missing(format!(
								"drawing {}/{}",
								key.date, key.view_mode
							))
						});
				}
				Err(RemoteError::VersionConflict { server_version, .. })
					if attempts < MAX_CONFLICT_ATTEMPTS =>
				{
					debug!(attempts, server_version, "drawing conflict, merging and retrying");
					let server = self
						.remote
						.fetch_drawing(&credentials, key.book_id, key.date, key.view_mode)
						.await?
						.ok_or(RemoteError::NotFound)?;

					let local_strokes = std::mem::take(&mut drawing.strokes);
					drawing.strokes = merge_strokes(server.strokes, local_strokes);
					drawing.version = server.version;
					drawing.updated_at = self.clock.now();
					drawing.dirty = true;
					self.store.put_drawing(&drawing).await?;
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	// ---- payload conversion ----

	/// Remote fill lands in the cache clean: present locally, not owed to
	/// the server
	fn note_from_payload(&self, payload: NotePayload) -> Note {
		let now = self.clock.now();
		let person_key = match (payload.person_name_key, payload.person_record_key) {
			(Some(name_key), Some(record_key)) => Some(crate::domain::PersonKey {
				name_key,
				record_key,
			}),
			_ => None,
		};
		Note {
			id: Uuid::new_v4(),
			event_id: payload.event_id,
			content: payload.content,
			version: payload.version,
			dirty: false,
			updated_at: payload.updated_at,
			cached_at: now,
			hit_count: 0,
			person_key,
			locked_by_device: None,
			locked_at: None,
		}
	}

	fn drawing_from_payload(&self, payload: DrawingPayload) -> ScheduleDrawing {
		let now = self.clock.now();
		ScheduleDrawing {
			id: Uuid::new_v4(),
			book_id: payload.book_id,
			effective_date: payload.effective_date,
			view_mode: payload.view_mode,
			strokes: payload.strokes,
			version: payload.version,
			dirty: false,
			updated_at: payload.updated_at,
			cached_at: now,
			hit_count: 0,
		}
	}
}
