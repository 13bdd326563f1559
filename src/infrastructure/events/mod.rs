//! Event bus for decoupled communication
//!
//! The UI subscribes here for its offline/syncing indicators; the engine
//! never calls into presentation code directly.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine-level events
#[derive(Debug, Clone)]
pub enum Event {
    /// Core has started
    CoreStarted,

    /// Core is shutting down
    CoreShutdown,

    /// Server reachability changed
    ConnectivityChanged {
        is_offline: bool,
    },

    /// A bulk sync cycle began
    SyncStarted,

    /// A bulk sync cycle finished
    SyncCompleted {
        pushed: usize,
        applied_from_server: u64,
        conflicts: usize,
    },

    /// A bulk sync cycle failed; dirty state is preserved
    SyncFailed {
        message: String,
    },

    /// Best-effort preload progress
    PreloadProgress {
        book_id: Uuid,
        loaded: usize,
        total: usize,
    },

    /// A cache cleanup pass removed entries
    CacheCleaned {
        removed: u64,
    },
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: Event) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
