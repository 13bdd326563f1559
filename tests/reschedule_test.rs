//! Event lifecycle and cross-device scenario tests

use chrono::Duration;
use inkbook_core::domain::{Book, Note, PersonKey};
use inkbook_core::infrastructure::remote::{FullSyncResponse, SyncConflict};
use inkbook_core::shared::Clock;
use inkbook_core::test_framework::TestHarness;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn reschedule_keeps_the_original_and_links_the_replacement() {
	let harness = TestHarness::registered().await;
	let now = harness.clock.now();
	let book = Book::new("clinic".to_string(), now);
	harness.core.store.put_book(&book).await.unwrap();

	let event = harness
		.core
		.schedule
		.create_event(book.id, "Jane Doe".to_string(), now, now + Duration::hours(1))
		.await
		.unwrap();
	harness
		.core
		.store
		.put_note(&Note::new(event.id, "pre-move ink".to_string(), now))
		.await
		.unwrap();

	let replacement = harness
		.core
		.schedule
		.reschedule(
			event.id,
			now + Duration::days(3),
			now + Duration::days(3) + Duration::hours(1),
		)
		.await
		.unwrap();

	// The original is soft-removed, never deleted
	let original = harness.core.store.event(event.id).await.unwrap().unwrap();
	assert!(original.is_removed);
	assert_eq!(original.removal_reason.as_deref(), Some("rescheduled"));
	assert_eq!(original.new_event_id, Some(replacement.id));
	assert_eq!(replacement.original_event_id, Some(event.id));
	assert_eq!(replacement.starts_at, now + Duration::days(3));

	// The handwriting came along
	let carried = harness
		.core
		.store
		.note_by_event(replacement.id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(carried.content, "pre-move ink");

	// Rescheduling a removed event is refused
	assert!(harness
		.core
		.schedule
		.reschedule(event.id, now, now + Duration::hours(1))
		.await
		.is_err());
}

/// Device A edits a person note offline while device B edits a different
/// event's note for the same person online. B synced first; when A comes
/// back, the conflict resolves newest-wins and neither edit is silently
/// dropped: A's strokes went out in A's push batch, B's content lands in
/// A's store, and A's record stays dirty for the next cycle.
#[tokio::test]
async fn offline_person_edit_conflict_drops_no_ink() {
	let harness = TestHarness::registered().await;
	let now = harness.clock.now();
	let book = Book::new("clinic".to_string(), now);
	harness.core.store.put_book(&book).await.unwrap();

	let mut event = harness
		.core
		.schedule
		.create_event(book.id, "Jane Doe".to_string(), now, now + Duration::hours(1))
		.await
		.unwrap();
	event.record_number = Some("REC1".to_string());
	event.dirty = false;
	harness.core.store.put_event(&event).await.unwrap();

	// Device A's offline edit at t1
	let mut ours = Note::new(event.id, "base +3 strokes".to_string(), now);
	ours.person_key = PersonKey::new("Jane Doe", "REC1");
	harness.core.store.put_note(&ours).await.unwrap();
	let ours = harness.core.store.note_by_event(event.id).await.unwrap().unwrap();

	// Device B's edit reached the server at t2 > t1
	let mut theirs = ours.clone();
	theirs.content = "base +2 strokes".to_string();
	theirs.updated_at = now + Duration::minutes(5);
	harness.remote.queue_full_sync_response(FullSyncResponse {
		success: true,
		changes_applied: 0,
		conflicts: vec![SyncConflict {
			table: "notes".to_string(),
			record_id: ours.id,
			server_timestamp: now + Duration::minutes(5),
			local_timestamp: now,
			server_payload: serde_json::to_value(&theirs).unwrap(),
		}],
		server_changes: Vec::new(),
		server_time: now + Duration::minutes(6),
	});

	let outcome = harness.core.sync.full_sync().await.unwrap();
	assert_eq!(outcome.conflicts, 1);

	// A's strokes were pushed, not silently dropped
	let pushed = harness.remote.full_sync_requests.lock().unwrap();
	assert!(pushed[0]
		.changes
		.iter()
		.any(|c| c.payload["content"] == "base +3 strokes"));
	drop(pushed);

	// B's newer content won locally, and the record stays dirty so the
	// reconciled note goes out on the next cycle
	let resolved = harness.core.store.note_by_event(event.id).await.unwrap().unwrap();
	assert_eq!(resolved.content, "base +2 strokes");
	assert!(resolved.dirty);

	let next = harness.core.sync.full_sync().await.unwrap();
	assert_eq!(next.pushed, 1);
	let pushed = harness.remote.full_sync_requests.lock().unwrap();
	assert!(pushed[1]
		.changes
		.iter()
		.any(|c| c.payload["content"] == "base +2 strokes"));
}
