//! Person sharing and lock subsystem integration tests

use chrono::Duration;
use inkbook_core::domain::{Book, Note, PersonKey};
use inkbook_core::shared::Clock;
use inkbook_core::test_framework::TestHarness;
use pretty_assertions::assert_eq;
use uuid::Uuid;

/// Two events for the same person (same name + record number) in one book
async fn person_pair(harness: &TestHarness) -> (Book, inkbook_core::domain::Event, inkbook_core::domain::Event) {
	let now = harness.clock.now();
	let book = Book::new("clinic".to_string(), now);
	harness.core.store.put_book(&book).await.unwrap();

	let mut first = harness
		.core
		.schedule
		.create_event(book.id, "Jane Doe".to_string(), now, now + Duration::hours(1))
		.await
		.unwrap();
	first.record_number = Some("REC1".to_string());
	harness.core.store.put_event(&first).await.unwrap();

	let mut second = harness
		.core
		.schedule
		.create_event(
			book.id,
			"Jane Doe".to_string(),
			now + Duration::days(7),
			now + Duration::days(7) + Duration::hours(1),
		)
		.await
		.unwrap();
	second.record_number = Some("REC1".to_string());
	harness.core.store.put_event(&second).await.unwrap();

	(book, first, second)
}

#[tokio::test]
async fn save_propagates_to_unlocked_group_members() {
	let harness = TestHarness::registered().await;
	let (_, first, second) = person_pair(&harness).await;
	let now = harness.clock.now();

	let note_a = Note::new(first.id, "first visit ink".to_string(), now);
	harness.core.store.put_note(&note_a).await.unwrap();
	harness.core.store.stamp_person_key(note_a.id, &PersonKey::new("Jane Doe", "REC1").unwrap()).await.unwrap();

	let note_b = Note::new(second.id, String::new(), now);
	harness.core.store.put_note(&note_b).await.unwrap();

	// Save through the sharing service on the second event
	let saved = harness
		.core
		.persons
		.save_with_sync(&second, Note::new(second.id, "updated ink".to_string(), now))
		.await
		.unwrap();
	assert_eq!(saved.content, "updated ink");

	// The first event's note converged to identical content
	let converged = harness
		.core
		.persons
		.load_for_event(&first)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(converged.content, "updated ink");
	assert!(converged.dirty);
}

#[tokio::test]
async fn load_adopts_strictly_newer_group_content() {
	let harness = TestHarness::registered().await;
	let (_, first, second) = person_pair(&harness).await;
	let now = harness.clock.now();
	let key = PersonKey::new("Jane Doe", "REC1").unwrap();

	let mut old = Note::new(first.id, "old ink".to_string(), now - Duration::hours(2));
	old.updated_at = now - Duration::hours(2);
	old.person_key = Some(key.clone());
	harness.core.store.put_note(&old).await.unwrap();

	let mut newer = Note::new(second.id, "newer ink".to_string(), now);
	newer.person_key = Some(key);
	harness.core.store.put_note(&newer).await.unwrap();

	let loaded = harness
		.core
		.persons
		.load_for_event(&first)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(loaded.content, "newer ink");
	assert_eq!(loaded.updated_at, now);

	// The newer member is left untouched by a load of the older one
	let untouched = harness
		.core
		.persons
		.load_for_event(&second)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(untouched.content, "newer ink");
}

#[tokio::test]
async fn locked_group_members_are_skipped_by_propagation() {
	let harness = TestHarness::registered().await;
	let (_, first, second) = person_pair(&harness).await;
	let now = harness.clock.now();
	let key = PersonKey::new("Jane Doe", "REC1").unwrap();

	// Another device is actively editing the first event's note
	let mut locked = Note::new(first.id, "their draft".to_string(), now);
	locked.person_key = Some(key.clone());
	locked.locked_by_device = Some(Uuid::new_v4());
	locked.locked_at = Some(now);
	harness.core.store.put_note(&locked).await.unwrap();

	harness
		.core
		.persons
		.save_with_sync(&second, Note::new(second.id, "our ink".to_string(), now))
		.await
		.unwrap();

	let untouched = harness
		.core
		.store
		.note_by_event(first.id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(untouched.content, "their draft");
}

#[tokio::test]
async fn stale_lock_can_be_acquired() {
	let harness = TestHarness::registered().await;
	let (_, first, _) = person_pair(&harness).await;
	let now = harness.clock.now();

	let other_device = Uuid::new_v4();
	let mut note = Note::new(first.id, "ink".to_string(), now);
	note.locked_by_device = Some(other_device);
	note.locked_at = Some(now);
	harness.core.store.put_note(&note).await.unwrap();
	let note = harness.core.store.note_by_event(first.id).await.unwrap().unwrap();

	// Fresh foreign lock: acquisition fails and the gate reports locked
	assert!(!harness.core.persons.acquire_lock(note.id).await.unwrap());
	assert!(harness.core.persons.is_locked_by_other(&note));

	// Six minutes later the lock is stale even though a holder is recorded
	harness.clock.advance(Duration::minutes(6));
	assert!(!harness.core.persons.is_locked_by_other(&note));
	assert!(harness.core.persons.acquire_lock(note.id).await.unwrap());

	let relocked = harness.core.store.note_by_event(first.id).await.unwrap().unwrap();
	assert_eq!(relocked.locked_by_device, Some(harness.core.device.device_id()));
}

#[tokio::test]
async fn stale_lock_sweep_clears_all_holders() {
	let harness = TestHarness::registered().await;
	let (_, first, second) = person_pair(&harness).await;
	let now = harness.clock.now();

	for (event, holder) in [(&first, Uuid::new_v4()), (&second, Uuid::new_v4())] {
		let mut note = Note::new(event.id, "ink".to_string(), now);
		note.locked_by_device = Some(holder);
		note.locked_at = Some(now);
		harness.core.store.put_note(&note).await.unwrap();
	}

	harness.clock.advance(Duration::minutes(6));
	let cleared = harness.core.persons.cleanup_stale_locks().await.unwrap();
	assert_eq!(cleared, 2);

	let note = harness.core.store.note_by_event(first.id).await.unwrap().unwrap();
	assert_eq!(note.locked_by_device, None);
	assert_eq!(note.locked_at, None);
}

#[tokio::test]
async fn record_number_update_adopts_existing_group_content() {
	let harness = TestHarness::registered().await;
	let now = harness.clock.now();
	let book = Book::new("clinic".to_string(), now);
	harness.core.store.put_book(&book).await.unwrap();

	// Established group member with content
	let mut existing = harness
		.core
		.schedule
		.create_event(book.id, "Jane Doe".to_string(), now, now + Duration::hours(1))
		.await
		.unwrap();
	existing.record_number = Some("REC1".to_string());
	harness.core.store.put_event(&existing).await.unwrap();
	let mut donor = Note::new(existing.id, "established ink".to_string(), now);
	donor.person_key = PersonKey::new("Jane Doe", "REC1");
	harness.core.store.put_note(&donor).await.unwrap();

	// Independently created event, record number discovered later
	let newcomer = harness
		.core
		.schedule
		.create_event(
			book.id,
			"Jane Doe".to_string(),
			now + Duration::days(1),
			now + Duration::days(1) + Duration::hours(1),
		)
		.await
		.unwrap();
	harness
		.core
		.store
		.put_note(&Note::new(newcomer.id, String::new(), now))
		.await
		.unwrap();

	harness
		.core
		.schedule
		.update_record_number(newcomer.id, "REC1".to_string())
		.await
		.unwrap();

	let adopted = harness
		.core
		.store
		.note_by_event(newcomer.id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(adopted.content, "established ink");
	assert_eq!(adopted.person_key, PersonKey::new("Jane Doe", "REC1"));
}

#[tokio::test]
async fn record_number_update_promotes_own_content_when_group_is_empty() {
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
		.put_note(&Note::new(event.id, "my own ink".to_string(), now))
		.await
		.unwrap();

	harness
		.core
		.schedule
		.update_record_number(event.id, "REC1".to_string())
		.await
		.unwrap();

	let promoted = harness
		.core
		.store
		.note_by_event(event.id)
		.await
		.unwrap()
		.unwrap();
	// Promotion stamps the key without touching the content
	assert_eq!(promoted.content, "my own ink");
	assert_eq!(promoted.person_key, PersonKey::new("Jane Doe", "REC1"));
}
