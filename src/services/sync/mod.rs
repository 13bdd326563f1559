//! Sync Engine - dirty-record collection, push/pull, conflict resolution
//!
//! One cycle collects every dirty record into a change batch, sends it with
//! the cursor, resolves reported conflicts by newest timestamp, applies the
//! server's own changes, and clears dirty flags only for records that were
//! pushed, did not conflict, and were not edited again mid-flight.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::device::DeviceManager;
use crate::domain::{Book, Event as DomainEvent, Note, ScheduleDrawing};
use crate::infrastructure::database::{LocalStore, StoreError};
use crate::infrastructure::remote::{
	FullSyncRequest, RemoteApi, RemoteError, SyncChange, SyncOperation,
};
use crate::shared::Clock;

pub mod coordinator;

pub use coordinator::{CoordinatorConfig, SyncCoordinator};

/// Sync cycle failures
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Remote(#[from] RemoteError),
}

/// Result of one full sync cycle
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
	/// Changes pushed and acknowledged without conflict
	pub pushed: usize,
	/// Server changes applied locally
	pub applied_from_server: u64,
	/// Conflicts reported by the server
	pub conflicts: usize,
}

/// Bidirectional synchronization over the local store and remote client
pub struct SyncEngine {
	store: Arc<LocalStore>,
	remote: Arc<dyn RemoteApi>,
	device: Arc<DeviceManager>,
	clock: Arc<dyn Clock>,
}

impl SyncEngine {
	pub fn new(
		store: Arc<LocalStore>,
		remote: Arc<dyn RemoteApi>,
		device: Arc<DeviceManager>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			store,
			remote,
			device,
			clock,
		}
	}

	/// Gather every dirty record into one batch. Each dirty event is bundled
	/// with its dirty note so the pair lands in one push; remaining dirty
	/// notes and drawings follow.
	pub async fn collect_dirty(&self) -> Result<Vec<SyncChange>, SyncError> {
		let mut changes = Vec::new();
		let mut bundled_notes: HashSet<Uuid> = HashSet::new();

		for event in self.store.dirty_events().await? {
			changes.push(change(
				"events",
				event.id,
				serde_json::to_value(&event).map_err(StoreError::from)?,
				event.updated_at,
				event.version,
			));
			if let Some(note) = self.store.note_by_event(event.id).await? {
				if note.dirty {
					bundled_notes.insert(note.id);
					changes.push(note_change(&note)?);
				}
			}
		}

		for note in self.store.dirty_notes().await? {
			if !bundled_notes.contains(&note.id) {
				changes.push(note_change(&note)?);
			}
		}

		for drawing in self.store.dirty_drawings().await? {
			changes.push(change(
				"drawings",
				drawing.id,
				serde_json::to_value(&drawing).map_err(StoreError::from)?,
				drawing.updated_at,
				drawing.version,
			));
		}

		Ok(changes)
	}

	/// One full push/pull cycle
	#[instrument(skip(self))]
	pub async fn full_sync(&self) -> Result<SyncOutcome, SyncError> {
		let credentials = self
			.device
			.credentials()
			.ok_or(RemoteError::NotRegistered)?;

		let changes = self.collect_dirty().await?;
		let last_sync_at = self.store.last_sync_at().await?;
		debug!(changes = changes.len(), ?last_sync_at, "starting sync cycle");

		let request = FullSyncRequest {
			changes: changes.clone(),
			last_sync_at,
		};
		let response = self.remote.full_sync(&credentials, &request).await?;

		// Newest timestamp wins. When the server copy is newer it replaces
		// the local content; either way the record stays dirty and is
		// re-pushed next cycle, so the loser only loses priority, never
		// durability.
		let mut conflicted: HashSet<(String, Uuid)> = HashSet::new();
		for conflict in &response.conflicts {
			conflicted.insert((conflict.table.clone(), conflict.record_id));
			if conflict.server_timestamp > conflict.local_timestamp {
				debug!(
					table = %conflict.table,
					record_id = %conflict.record_id,
					"server copy is newer, adopting"
				);
				self.adopt_server_copy(
					&conflict.table,
					conflict.record_id,
					&conflict.server_payload,
				)
				.await?;
			} else {
				debug!(
					table = %conflict.table,
					record_id = %conflict.record_id,
					"local copy is newer, keeping dirty for re-push"
				);
			}
		}

		let applied = self.apply_server_changes(&response.server_changes).await?;

		let synced: Vec<SyncChange> = changes
			.into_iter()
			.filter(|c| !conflicted.contains(&(c.table.clone(), c.record_id)))
			.collect();
		self.mark_synced(&synced, response.server_time).await?;

		let outcome = SyncOutcome {
			pushed: synced.len(),
			applied_from_server: applied,
			conflicts: response.conflicts.len(),
		};
		info!(
			pushed = outcome.pushed,
			applied = outcome.applied_from_server,
			conflicts = outcome.conflicts,
			"sync cycle finished"
		);
		Ok(outcome)
	}

	/// Dispatch server changes by table into the local store. Unknown tables
	/// are logged and skipped, never fatal.
	pub async fn apply_server_changes(&self, changes: &[SyncChange]) -> Result<u64, SyncError> {
		let mut applied = 0u64;
		for change in changes {
			match self
				.apply_one(&change.table, change.record_id, change.operation, &change.payload)
				.await
			{
				Ok(true) => applied += 1,
				Ok(false) => {}
				Err(e) => return Err(e),
			}
		}
		Ok(applied)
	}

	/// Clear dirty flags for pushed, non-conflicted changes and stamp the
	/// cursor. The per-record snapshot guard keeps an edit that landed
	/// between send and acknowledgment dirty.
	pub async fn mark_synced(
		&self,
		changes: &[SyncChange],
		synced_at: chrono::DateTime<chrono::Utc>,
	) -> Result<(), SyncError> {
		for change in changes {
			let cleared = match change.table.as_str() {
				"events" => {
					self.store
						.clear_event_dirty(change.record_id, change.version, change.timestamp)
						.await?
				}
				"notes" => {
					self.store
						.clear_note_dirty(change.record_id, change.version, change.timestamp)
						.await?
				}
				"drawings" => {
					self.store
						.clear_drawing_dirty(change.record_id, change.version, change.timestamp)
						.await?
				}
				other => {
					warn!(table = other, "unknown table in pushed batch");
					true
				}
			};
			if !cleared {
				debug!(
					table = %change.table,
					record_id = %change.record_id,
					"record edited during push, staying dirty"
				);
			}
		}
		self.store.set_last_sync_at(synced_at).await?;
		Ok(())
	}

	/// Conflict loser path: adopt the server payload as local content, but
	/// keep the record dirty. The flag is cleared only by a confirmed
	/// acknowledgment of our own push, never speculatively.
	async fn adopt_server_copy(
		&self,
		table: &str,
		record_id: Uuid,
		payload: &serde_json::Value,
	) -> Result<(), SyncError> {
		match table {
			"events" => {
				let mut event: DomainEvent =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				event.dirty = true;
				self.store.put_event(&event).await?;
			}
			"notes" => {
				let mut note: Note =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				note.dirty = true;
				note.cached_at = self.clock.now();
				note.locked_by_device = None;
				note.locked_at = None;
				self.store.put_note(&note).await?;
			}
			"drawings" => {
				let mut drawing: ScheduleDrawing =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				drawing.dirty = true;
				drawing.cached_at = self.clock.now();
				self.store.put_drawing(&drawing).await?;
			}
			other => {
				warn!(table = other, %record_id, "unknown table in conflict, skipping");
			}
		}
		Ok(())
	}

	/// Apply one remote change. Returns false when skipped (unknown table,
	/// or outranked by a newer dirty local copy).
	async fn apply_one(
		&self,
		table: &str,
		record_id: Uuid,
		operation: SyncOperation,
		payload: &serde_json::Value,
	) -> Result<bool, SyncError> {
		match table {
			"books" => self.apply_book(record_id, operation, payload).await,
			"events" => self.apply_event(record_id, operation, payload).await,
			"notes" => self.apply_note(record_id, operation, payload).await,
			"drawings" => self.apply_drawing(record_id, operation, payload).await,
			other => {
				warn!(table = other, %record_id, "unknown table in server changes, skipping");
				Ok(false)
			}
		}
	}

	async fn apply_book(
		&self,
		record_id: Uuid,
		operation: SyncOperation,
		payload: &serde_json::Value,
	) -> Result<bool, SyncError> {
		match operation {
			SyncOperation::Update => {
				let book: Book =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				self.store.put_book(&book).await?;
				Ok(true)
			}
			SyncOperation::Delete => {
				// Books are never physically deleted locally; archive instead
				if let Some(mut book) = self.store.book(record_id).await? {
					book.archived_at = Some(self.clock.now());
					self.store.put_book(&book).await?;
				}
				Ok(true)
			}
		}
	}

	async fn apply_event(
		&self,
		record_id: Uuid,
		operation: SyncOperation,
		payload: &serde_json::Value,
	) -> Result<bool, SyncError> {
		if let Some(local) = self.store.event(record_id).await? {
			if local.dirty {
				// The conflict path owns this record; a blind apply would
				// clobber an unpushed edit
				debug!(%record_id, "skipping server event over dirty local copy");
				return Ok(false);
			}
		}
		match operation {
			SyncOperation::Update => {
				let mut event: DomainEvent =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				event.dirty = false;
				self.store.put_event(&event).await?;
				Ok(true)
			}
			SyncOperation::Delete => {
				if let Some(mut event) = self.store.event(record_id).await? {
					event.is_removed = true;
					if event.removal_reason.is_none() {
						event.removal_reason = Some("removed remotely".to_string());
					}
					event.dirty = false;
					event.updated_at = self.clock.now();
					self.store.put_event(&event).await?;
				}
				Ok(true)
			}
		}
	}

	async fn apply_note(
		&self,
		record_id: Uuid,
		operation: SyncOperation,
		payload: &serde_json::Value,
	) -> Result<bool, SyncError> {
		if let Some(local) = self.store.note(record_id).await? {
			if local.dirty {
				debug!(%record_id, "skipping server note over dirty local copy");
				return Ok(false);
			}
		}
		match operation {
			SyncOperation::Update => {
				let mut note: Note =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				note.dirty = false;
				note.cached_at = self.clock.now();
				note.locked_by_device = None;
				note.locked_at = None;
				self.store.put_note(&note).await?;
				Ok(true)
			}
			SyncOperation::Delete => {
				self.store.delete_note(record_id).await?;
				Ok(true)
			}
		}
	}

	async fn apply_drawing(
		&self,
		record_id: Uuid,
		operation: SyncOperation,
		payload: &serde_json::Value,
	) -> Result<bool, SyncError> {
		if let Some(local) = self.store.drawing(record_id).await? {
			if local.dirty {
				debug!(%record_id, "skipping server drawing over dirty local copy");
				return Ok(false);
			}
		}
		match operation {
			SyncOperation::Update => {
				let mut drawing: ScheduleDrawing =
					serde_json::from_value(payload.clone()).map_err(StoreError::from)?;
				drawing.dirty = false;
				drawing.cached_at = self.clock.now();
				self.store.put_drawing(&drawing).await?;
				Ok(true)
			}
			SyncOperation::Delete => {
				self.store.delete_drawing(record_id).await?;
				Ok(true)
			}
		}
	}
}

fn change(
	table: &str,
	record_id: Uuid,
	payload: serde_json::Value,
	timestamp: chrono::DateTime<chrono::Utc>,
	version: i64,
) -> SyncChange {
	SyncChange {
		table: table.to_string(),
		record_id,
		operation: SyncOperation::Update,
		payload,
		timestamp,
		version,
	}
}

fn note_change(note: &Note) -> Result<SyncChange, SyncError> {
	Ok(change(
		"notes",
		note.id,
		serde_json::to_value(note).map_err(StoreError::from)?,
		note.updated_at,
		note.version,
	))
}
