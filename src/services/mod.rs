//! Engine services

pub mod cache;
pub mod content;
pub mod person;
pub mod schedule;
pub mod sync;

pub use cache::CacheManager;
pub use content::{ContentError, ContentService, DrawingKey, NoteKey};
pub use person::{PersonSharing, SharingError};
pub use schedule::{ScheduleError, ScheduleService};
pub use sync::{CoordinatorConfig, SyncCoordinator, SyncEngine, SyncError, SyncOutcome};
