//! Inkbook Core
//!
//! The offline-first content synchronization and caching engine behind a
//! handwritten appointment book. Records live in a durable local store and
//! stay editable without a network; a sync engine converges them with the
//! remote store whenever connectivity allows.

pub mod config;
pub mod device;
pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod shared;

pub mod test_framework;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::device::DeviceManager;
use crate::infrastructure::database::{Database, LocalStore};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::remote::{RemoteApi, RemoteClient};
use crate::services::{
	CacheManager, ContentService, CoordinatorConfig, NoteKey, PersonSharing, ScheduleService,
	SyncCoordinator, SyncEngine,
};
use crate::shared::{Clock, GenerationCounter, SaveQueue, SystemClock};

/// Cadence of the periodic stale-lock sweep
const LOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The main context for all engine operations
pub struct Core {
	/// Application configuration
	pub config: AppConfig,

	/// Event bus the UI subscribes to
	pub events: Arc<EventBus>,

	/// Device identity and credentials
	pub device: Arc<DeviceManager>,

	/// Record database
	pub database: Arc<Database>,

	/// Typed store facade
	pub store: Arc<LocalStore>,

	/// Cache eviction policy
	pub cache: Arc<CacheManager>,

	/// Cache-first content access
	pub content: Arc<ContentService>,

	/// Person sharing and locks
	pub persons: Arc<PersonSharing>,

	/// Event lifecycle operations
	pub schedule: Arc<ScheduleService>,

	/// Push/pull sync engine
	pub sync: Arc<SyncEngine>,

	/// Connectivity-triggered sync orchestration
	pub coordinator: Arc<SyncCoordinator>,
}

impl Core {
	/// Create a core rooted at the given data directory, talking to the
	/// configured remote store over HTTP
	pub async fn new(data_dir: PathBuf) -> Result<Self> {
		let config = AppConfig::load_from(&data_dir)?;
		let remote: Arc<dyn RemoteApi> = Arc::new(RemoteClient::new(config.api_url.clone())?);
		Self::with_parts(config, remote, Arc::new(SystemClock)).await
	}

	/// Create a core with an injected remote client and clock; the seam
	/// tests build on
	pub async fn with_parts(
		config: AppConfig,
		remote: Arc<dyn RemoteApi>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		config.ensure_directories()?;

		let events = Arc::new(EventBus::default());
		let device = Arc::new(DeviceManager::init(&config.data_dir)?);

		let database = Arc::new(Database::open(&config.database_path()).await?);
		database.migrate().await?;
		let store = Arc::new(LocalStore::new(database.clone()));

		let queue = Arc::new(SaveQueue::new());
		let cache = Arc::new(CacheManager::new(
			store.clone(),
			clock.clone(),
			events.clone(),
		));
		let content = Arc::new(ContentService::new(
			store.clone(),
			remote.clone(),
			device.clone(),
			cache.clone(),
			queue.clone(),
			clock.clone(),
			events.clone(),
		));
		let persons = Arc::new(PersonSharing::new(
			store.clone(),
			device.clone(),
			clock.clone(),
			queue,
		));
		let schedule = Arc::new(ScheduleService::new(
			store.clone(),
			persons.clone(),
			clock.clone(),
		));
		let sync = Arc::new(SyncEngine::new(
			store.clone(),
			remote.clone(),
			device.clone(),
			clock,
		));
		let coordinator = Arc::new(SyncCoordinator::new(
			sync.clone(),
			remote,
			device.clone(),
			events.clone(),
			CoordinatorConfig {
				sync_interval: Duration::from_secs(config.sync_interval_secs),
				..CoordinatorConfig::default()
			},
		));

		// Housekeeping is best-effort; a failed sweep never blocks startup
		if let Err(e) = cache.startup_cleanup().await {
			warn!("startup cache cleanup failed: {e}");
		}

		events.emit(Event::CoreStarted);

		Ok(Self {
			config,
			events,
			device,
			database,
			store,
			cache,
			content,
			persons,
			schedule,
			sync,
			coordinator,
		})
	}

	/// Start background orchestration: the connectivity-triggered sync
	/// coordinator and the stale-lock sweep
	pub async fn start(&self) {
		self.coordinator.start().await;
		self.persons.start_lock_sweep(LOCK_SWEEP_INTERVAL);
	}

	/// Best-effort warm-up of every note in a book, cancellable through the
	/// window generation counter
	pub async fn preload_book(
		&self,
		book_id: Uuid,
		generation: &GenerationCounter,
	) -> Result<(usize, usize)> {
		let keys: Vec<NoteKey> = self
			.store
			.events_for_book(book_id)
			.await?
			.into_iter()
			.map(|event| NoteKey {
				book_id,
				event_id: event.id,
			})
			.collect();
		Ok(self.content.preload_notes(book_id, keys, generation).await)
	}

	/// Stop background orchestration
	pub async fn shutdown(&self) {
		self.coordinator.stop();
		self.persons.stop_lock_sweep();
		self.events.emit(Event::CoreShutdown);
	}
}

/// Initialize tracing with an env-filter, falling back to the given level
pub fn init_logging(default_level: &str) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}
