//! Cache Manager - eviction policy over the local store
//!
//! Two sweeps: an age-based one driven by `cache_duration_days`, and a
//! size-bounded LRU one driven by `max_cache_size_mb`. Coldness is lowest
//! hit count first, oldest cache stamp second. Dirty entries are never
//! evicted; an unsynced edit is the only copy in existence.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument};

use crate::infrastructure::database::{CachePolicy, LocalStore, StoreError};
use crate::infrastructure::events::{Event, EventBus};
use crate::shared::Clock;

/// Entries deleted per kind in one LRU round
const LRU_BATCH: u64 = 10;

/// Hard stop for one `evict_lru` call, terminates pathological inputs
const MAX_LRU_DELETIONS: u64 = 1_000;

const BYTES_PER_MB: i64 = 1024 * 1024;

/// Eviction policy operating over the local store
pub struct CacheManager {
	store: Arc<LocalStore>,
	clock: Arc<dyn Clock>,
	events: Arc<EventBus>,
}

impl CacheManager {
	pub fn new(store: Arc<LocalStore>, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
		Self {
			store,
			clock,
			events,
		}
	}

	pub async fn policy(&self) -> Result<CachePolicy, StoreError> {
		self.store.cache_policy().await
	}

	pub async fn set_policy(&self, policy: &CachePolicy) -> Result<(), StoreError> {
		self.store.set_cache_policy(policy).await
	}

	/// Total cached content size across notes and drawings, in bytes
	pub async fn total_cached_size(&self) -> Result<i64, StoreError> {
		Ok(self.store.notes_cached_size().await? + self.store.drawings_cached_size().await?)
	}

	/// Delete every cached entry older than the configured duration.
	/// Notes and drawings are swept independently. Returns count removed.
	#[instrument(skip(self))]
	pub async fn evict_expired(&self) -> Result<u64, StoreError> {
		let policy = self.store.cache_policy().await?;
		let cutoff = self.clock.now() - Duration::days(policy.cache_duration_days);

		let notes = self.store.evict_expired_notes(cutoff).await?;
		let drawings = self.store.evict_expired_drawings(cutoff).await?;
		let removed = notes + drawings;

		if removed > 0 {
			info!(notes, drawings, "evicted expired cache entries");
		}
		Ok(removed)
	}

	/// Delete cold entries in fixed batches until total size fits the
	/// target. Stops when a batch removes nothing or the deletion cap is
	/// reached, so the loop always terminates.
	#[instrument(skip(self))]
	pub async fn evict_lru(&self, target_mb: i64) -> Result<u64, StoreError> {
		let target_bytes = target_mb * BYTES_PER_MB;
		let mut deleted = 0u64;

		while self.total_cached_size().await? > target_bytes {
			if deleted >= MAX_LRU_DELETIONS {
				debug!(deleted, "hit LRU deletion cap, stopping");
				break;
			}

			let removed = self.store.evict_coldest_notes(LRU_BATCH).await?
				+ self.store.evict_coldest_drawings(LRU_BATCH).await?;
			if removed == 0 {
				// Everything left is dirty and must not be evicted
				break;
			}
			deleted += removed;
		}

		if deleted > 0 {
			info!(deleted, target_mb, "evicted cold cache entries");
		}
		Ok(deleted)
	}

	/// Startup sweep, gated on the auto-cleanup flag
	pub async fn startup_cleanup(&self) -> Result<(), StoreError> {
		let policy = self.store.cache_policy().await?;
		if !policy.auto_cleanup {
			debug!("auto cleanup disabled, skipping startup sweep");
			return Ok(());
		}

		let mut removed = self.evict_expired().await?;
		if self.total_cached_size().await? > policy.max_cache_size_mb * BYTES_PER_MB {
			removed += self.evict_lru(policy.max_cache_size_mb).await?;
		}

		self.store.stamp_cleanup(self.clock.now()).await?;
		if removed > 0 {
			self.events.emit(Event::CacheCleaned { removed });
		}
		Ok(())
	}

	/// Post-write guard: re-check the budget after a cache write and run the
	/// cleanup sequence synchronously when exceeded
	pub async fn enforce_budget(&self) -> Result<(), StoreError> {
		let policy = self.store.cache_policy().await?;
		if self.total_cached_size().await? <= policy.max_cache_size_mb * BYTES_PER_MB {
			return Ok(());
		}

		let mut removed = self.evict_expired().await?;
		if self.total_cached_size().await? > policy.max_cache_size_mb * BYTES_PER_MB {
			removed += self.evict_lru(policy.max_cache_size_mb).await?;
		}

		self.store.stamp_cleanup(self.clock.now()).await?;
		if removed > 0 {
			self.events.emit(Event::CacheCleaned { removed });
		}
		Ok(())
	}
}
