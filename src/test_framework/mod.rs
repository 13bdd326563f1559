//! Test support: an in-memory remote store and a pre-wired engine harness
//!
//! `MockRemote` implements the same [`RemoteApi`] seam the HTTP client
//! does, backed by hash maps and scriptable error queues, so engine tests
//! exercise the real services against a deterministic server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::device::Credentials;
use crate::domain::ViewMode;
use crate::infrastructure::remote::{
	DrawingPayload, FullSyncRequest, FullSyncResponse, NotePayload, RemoteApi, RemoteError,
	SavedVersion,
};
use crate::shared::ManualClock;
use crate::Core;

/// Key of a drawing page on the mock server
pub type DrawingPage = (Uuid, NaiveDate, ViewMode);

/// Scriptable in-memory remote store
#[derive(Default)]
pub struct MockRemote {
	pub healthy: AtomicBool,
	pub notes: Mutex<HashMap<Uuid, NotePayload>>,
	pub drawings: Mutex<HashMap<DrawingPage, DrawingPayload>>,
	/// Errors popped by the next note pushes, front first
	pub note_push_errors: Mutex<VecDeque<RemoteError>>,
	/// Errors popped by the next drawing pushes, front first
	pub drawing_push_errors: Mutex<VecDeque<RemoteError>>,
	/// Canned full-sync responses, front first; empty means echo success
	pub full_sync_responses: Mutex<VecDeque<FullSyncResponse>>,
	/// Every full-sync request received
	pub full_sync_requests: Mutex<Vec<FullSyncRequest>>,
	/// Invoked on every note fetch; lets tests interleave with a walk
	#[allow(clippy::type_complexity)]
	pub fetch_note_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockRemote {
	pub fn new() -> Self {
		let remote = Self::default();
		remote.healthy.store(true, Ordering::Release);
		remote
	}

	pub fn set_healthy(&self, healthy: bool) {
		self.healthy.store(healthy, Ordering::Release);
	}

	pub fn seed_note(&self, payload: NotePayload) {
		self.notes
			.lock()
			.unwrap()
			.insert(payload.event_id, payload);
	}

	pub fn seed_drawing(&self, payload: DrawingPayload) {
		self.drawings.lock().unwrap().insert(
			(payload.book_id, payload.effective_date, payload.view_mode),
			payload,
		);
	}

	pub fn push_note_error(&self, error: RemoteError) {
		self.note_push_errors.lock().unwrap().push_back(error);
	}

	pub fn push_drawing_error(&self, error: RemoteError) {
		self.drawing_push_errors.lock().unwrap().push_back(error);
	}

	pub fn queue_full_sync_response(&self, response: FullSyncResponse) {
		self.full_sync_responses.lock().unwrap().push_back(response);
	}

	fn check_healthy(&self) -> Result<(), RemoteError> {
		if self.healthy.load(Ordering::Acquire) {
			Ok(())
		} else {
			Err(RemoteError::Network("mock server is down".to_string()))
		}
	}
}

#[async_trait]
impl RemoteApi for MockRemote {
	async fn health(&self, _credentials: Option<&Credentials>) -> Result<(), RemoteError> {
		self.check_healthy()
	}

	async fn fetch_note(
		&self,
		_credentials: &Credentials,
		_book_id: Uuid,
		event_id: Uuid,
	) -> Result<Option<NotePayload>, RemoteError> {
		self.check_healthy()?;
		if let Some(hook) = self.fetch_note_hook.lock().unwrap().as_ref() {
			hook();
		}
		Ok(self.notes.lock().unwrap().get(&event_id).cloned())
	}

	async fn push_note(
		&self,
		_credentials: &Credentials,
		_book_id: Uuid,
		payload: &NotePayload,
	) -> Result<SavedVersion, RemoteError> {
		self.check_healthy()?;
		if let Some(error) = self.note_push_errors.lock().unwrap().pop_front() {
			return Err(error);
		}
		let mut notes = self.notes.lock().unwrap();
		let version = notes
			.get(&payload.event_id)
			.map(|stored| stored.version.max(payload.version))
			.unwrap_or(payload.version)
			+ 1;
		let mut stored = payload.clone();
		stored.version = version;
		notes.insert(payload.event_id, stored);
		Ok(SavedVersion {
			version,
			server_time: Utc::now(),
		})
	}

	async fn delete_note(
		&self,
		_credentials: &Credentials,
		_book_id: Uuid,
		event_id: Uuid,
	) -> Result<(), RemoteError> {
		self.check_healthy()?;
		self.notes.lock().unwrap().remove(&event_id);
		Ok(())
	}

	async fn fetch_drawing(
		&self,
		_credentials: &Credentials,
		book_id: Uuid,
		date: NaiveDate,
		view_mode: ViewMode,
	) -> Result<Option<DrawingPayload>, RemoteError> {
		self.check_healthy()?;
		Ok(self
			.drawings
			.lock()
			.unwrap()
			.get(&(book_id, date, view_mode))
			.cloned())
	}

	async fn push_drawing(
		&self,
		_credentials: &Credentials,
		payload: &DrawingPayload,
	) -> Result<SavedVersion, RemoteError> {
		self.check_healthy()?;
		if let Some(error) = self.drawing_push_errors.lock().unwrap().pop_front() {
			return Err(error);
		}
		let key = (payload.book_id, payload.effective_date, payload.view_mode);
		let mut drawings = self.drawings.lock().unwrap();
		let version = drawings
			.get(&key)
			.map(|stored| stored.version.max(payload.version))
			.unwrap_or(payload.version)
			+ 1;
		let mut stored = payload.clone();
		stored.version = version;
		drawings.insert(key, stored);
		Ok(SavedVersion {
			version,
			server_time: Utc::now(),
		})
	}

	async fn full_sync(
		&self,
		_credentials: &Credentials,
		request: &FullSyncRequest,
	) -> Result<FullSyncResponse, RemoteError> {
		self.check_healthy()?;
		self.full_sync_requests.lock().unwrap().push(request.clone());
		if let Some(response) = self.full_sync_responses.lock().unwrap().pop_front() {
			return Ok(response);
		}
		Ok(FullSyncResponse {
			success: true,
			changes_applied: request.changes.len() as u64,
			conflicts: Vec::new(),
			server_changes: Vec::new(),
			server_time: Utc::now(),
		})
	}
}

/// A fully wired engine over a temp dir, a manual clock and a mock remote
pub struct TestHarness {
	pub core: Core,
	pub remote: Arc<MockRemote>,
	pub clock: Arc<ManualClock>,
	// Held for the lifetime of the harness; the directory is removed on drop
	_data_dir: tempfile::TempDir,
}

impl TestHarness {
	/// Build a registered engine; the mock remote starts healthy
	pub async fn registered() -> Self {
		let harness = Self::unregistered().await;
		harness
			.core
			.device
			.set_device_token("test-token".to_string())
			.unwrap();
		harness
	}

	/// Build an engine with no credentials; every remote path short-circuits
	pub async fn unregistered() -> Self {
		let data_dir = tempfile::tempdir().unwrap();
		let config = AppConfig::default_with_dir(data_dir.path().to_path_buf());
		let remote = Arc::new(MockRemote::new());
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
		));

		let core = Core::with_parts(config, remote.clone(), clock.clone())
			.await
			.unwrap();

		Self {
			core,
			remote,
			clock,
			_data_dir: data_dir,
		}
	}
}
