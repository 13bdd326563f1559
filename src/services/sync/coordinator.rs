//! Connectivity-triggered sync coordinator
//!
//! Watches network-interface changes and a fixed interval timer, re-probes
//! the server's health endpoint on every signal (an interface coming up
//! does not imply the server is reachable), and triggers a bulk sync on
//! unreachable-to-reachable transitions after a short settle delay.
//! Overlapping triggers are dropped, not queued; the next tick retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use if_watch::tokio::IfWatcher;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::device::DeviceManager;
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::remote::RemoteApi;
use crate::services::sync::SyncEngine;

/// Coordinator timing knobs
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
	/// Interval of the timer-driven sync variant
	pub sync_interval: Duration,

	/// Wait after a reachability transition before the triggered sync
	pub settle_delay: Duration,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			sync_interval: Duration::from_secs(30),
			settle_delay: Duration::from_secs(1),
		}
	}
}

/// Network-state-driven orchestration of the sync engine
pub struct SyncCoordinator {
	engine: Arc<SyncEngine>,
	remote: Arc<dyn RemoteApi>,
	device: Arc<DeviceManager>,
	events: Arc<EventBus>,
	config: CoordinatorConfig,
	is_offline: AtomicBool,
	is_syncing: AtomicBool,
	is_running: AtomicBool,
}

impl SyncCoordinator {
	pub fn new(
		engine: Arc<SyncEngine>,
		remote: Arc<dyn RemoteApi>,
		device: Arc<DeviceManager>,
		events: Arc<EventBus>,
		config: CoordinatorConfig,
	) -> Self {
		Self {
			engine,
			remote,
			device,
			events,
			config,
			is_offline: AtomicBool::new(true),
			is_syncing: AtomicBool::new(false),
			is_running: AtomicBool::new(false),
		}
	}

	pub fn is_offline(&self) -> bool {
		self.is_offline.load(Ordering::Acquire)
	}

	pub fn is_syncing(&self) -> bool {
		self.is_syncing.load(Ordering::Acquire)
	}

	/// Probe the server once, kick an initial bulk sync when reachable, and
	/// start the monitoring loop
	pub async fn start(self: &Arc<Self>) {
		if self.is_running.swap(true, Ordering::AcqRel) {
			warn!("sync coordinator already running");
			return;
		}

		let reachable = self.probe().await;
		self.set_offline(!reachable);
		if reachable {
			self.trigger_sync();
		}

		let coordinator = self.clone();
		tokio::spawn(async move {
			coordinator.run_monitor().await;
			info!("sync coordinator stopped");
		});
	}

	pub fn stop(&self) {
		self.is_running.store(false, Ordering::Release);
	}

	async fn run_monitor(self: Arc<Self>) {
		let mut watcher = match IfWatcher::new() {
			Ok(watcher) => watcher,
			Err(e) => {
				error!("interface watcher unavailable: {e}");
				return;
			}
		};

		let mut interval = tokio::time::interval(self.config.sync_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		while self.is_running.load(Ordering::Acquire) {
			tokio::select! {
				event = watcher.next() => match event {
					Some(Ok(event)) => {
						debug!(?event, "network interface changed");
						self.on_interface_change().await;
					}
					Some(Err(e)) => warn!("interface watcher error: {e}"),
					None => break,
				},
				_ = interval.tick() => {
					// Timer-driven variant: re-probe and sync on a fixed cadence
					let reachable = self.probe().await;
					self.set_offline(!reachable);
					if reachable {
						self.trigger_sync();
					}
				}
			}
		}
	}

	/// Re-probe on every interface change; an unreachable-to-reachable
	/// transition settles briefly, confirms, then triggers
	async fn on_interface_change(self: &Arc<Self>) {
		let was_offline = self.is_offline();
		let reachable = self.probe().await;
		self.set_offline(!reachable);

		if was_offline && reachable {
			tokio::time::sleep(self.config.settle_delay).await;
			if self.probe().await {
				self.trigger_sync();
			} else {
				self.set_offline(true);
			}
		}
	}

	/// Application-level reachability, not interface state
	async fn probe(&self) -> bool {
		self.remote
			.health(self.device.credentials().as_ref())
			.await
			.is_ok()
	}

	fn set_offline(&self, offline: bool) {
		if self.is_offline.swap(offline, Ordering::AcqRel) != offline {
			info!(offline, "server reachability changed");
			self.events.emit(Event::ConnectivityChanged {
				is_offline: offline,
			});
		}
	}

	/// Kick a background bulk sync unless one is already in flight; an
	/// overlapping trigger is dropped and the next tick retries
	pub fn trigger_sync(self: &Arc<Self>) {
		if self
			.is_syncing
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			debug!("sync already in flight, dropping trigger");
			return;
		}

		let coordinator = self.clone();
		tokio::spawn(async move {
			coordinator.events.emit(Event::SyncStarted);
			match coordinator.engine.full_sync().await {
				Ok(outcome) => {
					coordinator.events.emit(Event::SyncCompleted {
						pushed: outcome.pushed,
						applied_from_server: outcome.applied_from_server,
						conflicts: outcome.conflicts,
					});
				}
				Err(e) => {
					warn!("bulk sync failed: {e}");
					coordinator.events.emit(Event::SyncFailed {
						message: e.to_string(),
					});
				}
			}
			coordinator.is_syncing.store(false, Ordering::Release);
		});
	}
}
