//! Content access service integration tests

use chrono::Duration;
use inkbook_core::domain::{Book, Event, Note, Stroke, ViewMode};
use inkbook_core::infrastructure::remote::{NotePayload, RemoteError};
use inkbook_core::services::{ContentError, DrawingKey, NoteKey};
use inkbook_core::shared::{Clock, GenerationCounter};
use inkbook_core::test_framework::TestHarness;
use pretty_assertions::assert_eq;
use uuid::Uuid;

async fn seed_event(harness: &TestHarness) -> (Book, Event) {
	let now = harness.clock.now();
	let book = Book::new("clinic".to_string(), now);
	harness.core.store.put_book(&book).await.unwrap();
	let event = Event::new(
		book.id,
		"Jane Doe".to_string(),
		now,
		now + Duration::hours(1),
		now,
	);
	harness.core.store.put_event(&event).await.unwrap();
	(book, event)
}

fn stroke() -> Stroke {
	Stroke {
		id: Uuid::new_v4(),
		points: vec![[1.0, 2.0], [3.0, 4.0]],
		width: 1.5,
		color: 0xff000000,
	}
}

#[tokio::test]
async fn cache_hit_returns_immediately_and_counts() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "local ink".to_string(), harness.clock.now()))
		.await
		.unwrap();

	// Remote down; the cached copy still serves
	harness.remote.set_healthy(false);

	let first = harness.core.content.get_note(key, false).await.unwrap().unwrap();
	assert_eq!(first.content, "local ink");
	let second = harness.core.content.get_note(key, false).await.unwrap().unwrap();
	assert_eq!(second.hit_count, first.hit_count + 1);
}

#[tokio::test]
async fn miss_fills_from_remote_as_clean() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let now = harness.clock.now();

	harness.remote.seed_note(NotePayload {
		event_id: event.id,
		content: "server ink".to_string(),
		version: 4,
		updated_at: now - Duration::hours(1),
		person_name_key: None,
		person_record_key: None,
	});

	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};
	let note = harness.core.content.get_note(key, false).await.unwrap().unwrap();
	assert_eq!(note.content, "server ink");
	assert_eq!(note.version, 4);
	assert!(!note.dirty);
}

#[tokio::test]
async fn unregistered_device_serves_cache_only() {
	let harness = TestHarness::unregistered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	// Nothing cached, no credentials: a miss, not an error
	assert!(harness.core.content.get_note(key, false).await.unwrap().is_none());

	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "offline ink".to_string(), harness.clock.now()))
		.await
		.unwrap();

	// Forced refresh still falls back to the cache without credentials
	let note = harness.core.content.get_note(key, true).await.unwrap().unwrap();
	assert_eq!(note.content, "offline ink");
	assert!(note.dirty);
}

#[tokio::test]
async fn fetch_failure_falls_back_to_cache() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "durable ink".to_string(), harness.clock.now()))
		.await
		.unwrap();
	harness.remote.set_healthy(false);

	let note = harness.core.content.get_note(key, true).await.unwrap().unwrap();
	assert_eq!(note.content, "durable ink");
}

#[tokio::test]
async fn refresh_never_clobbers_a_dirty_local_note() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let now = harness.clock.now();
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	harness.remote.seed_note(NotePayload {
		event_id: event.id,
		content: "server ink".to_string(),
		version: 9,
		updated_at: now,
		person_name_key: None,
		person_record_key: None,
	});
	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "unsynced edit".to_string(), now))
		.await
		.unwrap();

	let note = harness.core.content.get_note(key, true).await.unwrap().unwrap();
	assert_eq!(note.content, "unsynced edit");
	assert!(note.dirty);
}

#[tokio::test]
async fn sync_note_requires_registration() {
	let harness = TestHarness::unregistered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	let err = harness.core.content.sync_note(key).await.unwrap_err();
	assert!(matches!(
		err,
		ContentError::Remote(RemoteError::NotRegistered)
	));
}

#[tokio::test]
async fn sync_note_clears_dirty_and_adopts_server_version() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "push me".to_string(), harness.clock.now()))
		.await
		.unwrap();

	let synced = harness.core.content.sync_note(key).await.unwrap();
	assert!(!synced.dirty);
	assert_eq!(synced.version, 1);
}

#[tokio::test]
async fn sync_note_keeps_dirty_on_server_error() {
	let harness = TestHarness::registered().await;
	let (book, event) = seed_event(&harness).await;
	let key = NoteKey {
		book_id: book.id,
		event_id: event.id,
	};

	harness
		.core
		.content
		.save_note(key, Note::new(event.id, "stubborn ink".to_string(), harness.clock.now()))
		.await
		.unwrap();
	harness
		.remote
		.push_note_error(RemoteError::Server { status: 500 });

	let err = harness.core.content.sync_note(key).await.unwrap_err();
	assert!(matches!(
		err,
		ContentError::Remote(RemoteError::Server { status: 500 })
	));

	let note = harness.core.store.note_by_event(event.id).await.unwrap().unwrap();
	assert!(note.dirty);
}

#[tokio::test]
async fn drawing_conflict_merges_and_retries() {
	let harness = TestHarness::registered().await;
	let (book, _) = seed_event(&harness).await;
	let now = harness.clock.now();
	let key = DrawingKey {
		book_id: book.id,
		date: now.date_naive(),
		view_mode: ViewMode::Day,
	};

	// Local ink: two strokes
	let local_strokes = vec![stroke(), stroke()];
	harness
		.core
		.content
		.save_drawing(key, local_strokes.clone())
		.await
		.unwrap();

	// Server already has three other strokes at version 7
	let server_strokes = vec![stroke(), stroke(), stroke()];
	harness.remote.seed_drawing(inkbook_core::infrastructure::remote::DrawingPayload {
		book_id: book.id,
		effective_date: key.date,
		view_mode: key.view_mode,
		strokes: server_strokes.clone(),
		version: 7,
		updated_at: now - Duration::minutes(10),
	});
	harness
		.remote
		.push_drawing_error(RemoteError::VersionConflict {
			server_version: 7,
			server_payload: serde_json::Value::Null,
		});

	let merged = harness.core.content.sync_drawing(key).await.unwrap();

	// Server strokes first, then local ones; nothing dropped
	assert_eq!(merged.strokes.len(), server_strokes.len() + local_strokes.len());
	assert_eq!(merged.strokes[..3], server_strokes[..]);
	assert_eq!(merged.strokes[3..], local_strokes[..]);
	assert!(!merged.dirty);
	// The retry pushed at the server's version; the ack advanced it
	assert_eq!(merged.version, 8);
}

#[tokio::test]
async fn drawing_conflict_surfaces_after_bounded_attempts() {
	let harness = TestHarness::registered().await;
	let (book, _) = seed_event(&harness).await;
	let now = harness.clock.now();
	let key = DrawingKey {
		book_id: book.id,
		date: now.date_naive(),
		view_mode: ViewMode::Day,
	};

	harness.core.content.save_drawing(key, vec![stroke()]).await.unwrap();
	harness.remote.seed_drawing(inkbook_core::infrastructure::remote::DrawingPayload {
		book_id: book.id,
		effective_date: key.date,
		view_mode: key.view_mode,
		strokes: vec![stroke()],
		version: 2,
		updated_at: now,
	});
	for _ in 0..3 {
		harness
			.remote
			.push_drawing_error(RemoteError::VersionConflict {
				server_version: 2,
				server_payload: serde_json::Value::Null,
			});
	}

	let err = harness.core.content.sync_drawing(key).await.unwrap_err();
	assert!(matches!(
		err,
		ContentError::Remote(RemoteError::VersionConflict { .. })
	));

	// Still dirty, nothing lost
	let drawing = harness
		.core
		.store
		.drawing_for_page(key.book_id, key.date, key.view_mode)
		.await
		.unwrap()
		.unwrap();
	assert!(drawing.dirty);
}

async fn seed_remote_notes(harness: &TestHarness, book: &Book, count: usize) -> Vec<NoteKey> {
	let now = harness.clock.now();
	let mut keys = Vec::new();
	for i in 0..count {
		let event = Event::new(
			book.id,
			format!("person {i}"),
			now,
			now + Duration::hours(1),
			now,
		);
		harness.core.store.put_event(&event).await.unwrap();
		harness.remote.seed_note(NotePayload {
			event_id: event.id,
			content: format!("ink {i}"),
			version: 1,
			updated_at: now,
			person_name_key: None,
			person_record_key: None,
		});
		keys.push(NoteKey {
			book_id: book.id,
			event_id: event.id,
		});
	}
	keys
}

#[tokio::test]
async fn preload_fills_every_missing_note() {
	let harness = TestHarness::registered().await;
	let (book, _) = seed_event(&harness).await;

	let keys = seed_remote_notes(&harness, &book, 5).await;
	let generation = GenerationCounter::new();
	let (loaded, total) = harness
		.core
		.content
		.preload_notes(book.id, keys.clone(), &generation)
		.await;
	assert_eq!((loaded, total), (5, 5));

	for key in keys {
		let note = harness.core.store.note_by_event(key.event_id).await.unwrap().unwrap();
		assert!(!note.dirty);
	}
}

#[tokio::test]
async fn preload_stops_when_its_window_is_superseded() {
	let harness = TestHarness::registered().await;
	let (book, _) = seed_event(&harness).await;

	// Two batches worth of keys; the window changes during the first batch
	let keys = seed_remote_notes(&harness, &book, 60).await;
	let generation = std::sync::Arc::new(GenerationCounter::new());

	let bump_target = generation.clone();
	*harness.remote.fetch_note_hook.lock().unwrap() = Some(Box::new(move || {
		bump_target.bump();
	}));

	let (loaded, total) = harness
		.core
		.content
		.preload_notes(book.id, keys, &generation)
		.await;
	assert_eq!(total, 60);
	// The first batch completed, the second never started
	assert_eq!(loaded, 50);
}
