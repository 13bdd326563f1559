//! Serialized save queue
//!
//! Concurrent saves for the same logical resource are appended to a FIFO
//! queue drained by a single worker task, so writes to that resource never
//! interleave and none is lost to a last-write-wins race. Different
//! resources drain independently.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type QueuedSave = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The worker for a resource went away before completing the save
#[derive(Debug, thiserror::Error)]
#[error("save queue worker is gone")]
pub struct SaveQueueClosed;

/// Per-resource FIFO of deferred save operations
#[derive(Default)]
pub struct SaveQueue {
	workers: Mutex<HashMap<String, mpsc::UnboundedSender<QueuedSave>>>,
}

impl SaveQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Run `op` after every previously enqueued save for `resource` has
	/// completed. Returns the operation's output.
	pub async fn run<T, F>(&self, resource: impl Into<String>, op: F) -> Result<T, SaveQueueClosed>
	where
		T: Send + 'static,
		F: Future<Output = T> + Send + 'static,
	{
		let (done_tx, done_rx) = oneshot::channel();
		let job: QueuedSave = Box::pin(async move {
			// The caller may have gone away; the save still ran to completion.
			let _ = done_tx.send(op.await);
		});

		self.sender_for(resource.into())
			.send(job)
			.map_err(|_| SaveQueueClosed)?;

		done_rx.await.map_err(|_| SaveQueueClosed)
	}

	fn sender_for(&self, resource: String) -> mpsc::UnboundedSender<QueuedSave> {
		let mut workers = self.workers.lock().unwrap();
		workers
			.entry(resource.clone())
			.or_insert_with(|| {
				debug!(resource = %resource, "spawning save queue worker");
				let (tx, mut rx) = mpsc::unbounded_channel::<QueuedSave>();
				tokio::spawn(async move {
					while let Some(job) = rx.recv().await {
						job.await;
					}
				});
				tx
			})
			.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::time::Duration;

	#[tokio::test]
	async fn saves_for_one_resource_run_in_submission_order() {
		let queue = Arc::new(SaveQueue::new());
		let order = Arc::new(Mutex::new(Vec::new()));

		let mut handles = Vec::new();
		for i in 0..8usize {
			let queue = queue.clone();
			let order = order.clone();
			// Earlier saves sleep longer; only FIFO draining keeps them ordered.
			handles.push(tokio::spawn(async move {
				queue
					.run("note:a", async move {
						tokio::time::sleep(Duration::from_millis(40 - (i as u64 * 5))).await;
						order.lock().unwrap().push(i);
					})
					.await
					.unwrap();
			}));
			// Give the spawned task a chance to enqueue before the next one.
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		for handle in handles {
			handle.await.unwrap();
		}

		assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn resources_drain_independently() {
		let queue = Arc::new(SaveQueue::new());

		let slow = {
			let queue = queue.clone();
			tokio::spawn(async move {
				queue
					.run("note:slow", async {
						tokio::time::sleep(Duration::from_millis(200)).await;
						"slow"
					})
					.await
					.unwrap()
			})
		};
		tokio::time::sleep(Duration::from_millis(10)).await;

		let fast = queue.run("note:fast", async { "fast" }).await.unwrap();
		assert_eq!(fast, "fast");
		assert_eq!(slow.await.unwrap(), "slow");
	}
}
