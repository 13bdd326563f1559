//! Cache manager eviction tests

use chrono::Duration;
use inkbook_core::domain::{Book, Event, Note, ScheduleDrawing, Stroke, ViewMode};
use inkbook_core::shared::Clock;
use inkbook_core::test_framework::TestHarness;
use pretty_assertions::assert_eq;
use uuid::Uuid;

async fn seed_book(harness: &TestHarness) -> Book {
	let book = Book::new("clinic".to_string(), harness.clock.now());
	harness.core.store.put_book(&book).await.unwrap();
	book
}

async fn seed_clean_note(
	harness: &TestHarness,
	book: &Book,
	content: &str,
	age_days: i64,
	hit_count: i64,
) -> Event {
	let now = harness.clock.now();
	let event = Event::new(
		book.id,
		"someone".to_string(),
		now,
		now + Duration::hours(1),
		now,
	);
	harness.core.store.put_event(&event).await.unwrap();

	let mut note = Note::new(event.id, content.to_string(), now);
	note.dirty = false;
	note.cached_at = now - Duration::days(age_days);
	note.hit_count = hit_count;
	harness.core.store.put_note(&note).await.unwrap();
	event
}

fn stroke() -> Stroke {
	Stroke {
		id: Uuid::new_v4(),
		points: vec![[0.0, 0.0], [10.0, 10.0]],
		width: 2.0,
		color: 0xff202020,
	}
}

#[tokio::test]
async fn expired_entries_are_swept_independently() {
	let harness = TestHarness::registered().await;
	let book = seed_book(&harness).await;
	let now = harness.clock.now();

	// Default policy: 90 day duration
	let fresh = seed_clean_note(&harness, &book, "fresh", 10, 0).await;
	let stale = seed_clean_note(&harness, &book, "stale", 120, 0).await;

	let mut drawing = ScheduleDrawing::new(
		book.id,
		now.date_naive(),
		ViewMode::Week,
		vec![stroke()],
		now,
	);
	drawing.dirty = false;
	drawing.cached_at = now - Duration::days(120);
	harness.core.store.put_drawing(&drawing).await.unwrap();

	let removed = harness.core.cache.evict_expired().await.unwrap();
	assert_eq!(removed, 2);

	assert!(harness.core.store.note_by_event(fresh.id).await.unwrap().is_some());
	assert!(harness.core.store.note_by_event(stale.id).await.unwrap().is_none());
	assert!(harness
		.core
		.store
		.drawing_for_page(book.id, now.date_naive(), ViewMode::Week)
		.await
		.unwrap()
		.is_none());
}

#[tokio::test]
async fn lru_eviction_converges_to_target() {
	let harness = TestHarness::registered().await;
	let book = seed_book(&harness).await;

	// ~4 KiB of clean cached content across 16 notes, warm ones last
	for i in 0..16 {
		seed_clean_note(&harness, &book, &"x".repeat(256), 5, i).await;
	}
	let before = harness.core.cache.total_cached_size().await.unwrap();
	assert_eq!(before, 16 * 256);

	// Target of zero forces eviction down to whatever cannot be removed
	let deleted = harness.core.cache.evict_lru(0).await.unwrap();
	assert_eq!(deleted, 16);
	assert_eq!(harness.core.cache.total_cached_size().await.unwrap(), 0);
}

#[tokio::test]
async fn lru_eviction_stops_when_only_dirty_entries_remain() {
	let harness = TestHarness::registered().await;
	let book = seed_book(&harness).await;
	let now = harness.clock.now();

	let event = Event::new(
		book.id,
		"someone".to_string(),
		now,
		now + Duration::hours(1),
		now,
	);
	harness.core.store.put_event(&event).await.unwrap();
	// An unsynced local edit; eviction must never remove it
	harness
		.core
		.store
		.put_note(&Note::new(event.id, "x".repeat(512), now))
		.await
		.unwrap();

	let deleted = harness.core.cache.evict_lru(0).await.unwrap();
	assert_eq!(deleted, 0);
	assert!(harness.core.store.note_by_event(event.id).await.unwrap().is_some());
}

#[tokio::test]
async fn coldest_entries_go_first() {
	let harness = TestHarness::registered().await;
	let book = seed_book(&harness).await;

	let cold = seed_clean_note(&harness, &book, &"c".repeat(300), 30, 0).await;
	let warm = seed_clean_note(&harness, &book, &"w".repeat(300), 30, 50).await;

	let deleted = harness.core.store.evict_coldest_notes(1).await.unwrap();
	assert_eq!(deleted, 1);
	assert!(harness.core.store.note_by_event(cold.id).await.unwrap().is_none());
	assert!(harness.core.store.note_by_event(warm.id).await.unwrap().is_some());
}

#[tokio::test]
async fn startup_cleanup_is_gated_on_auto_cleanup() {
	let harness = TestHarness::registered().await;
	let book = seed_book(&harness).await;
	let stale = seed_clean_note(&harness, &book, "stale", 120, 0).await;

	let mut policy = harness.core.cache.policy().await.unwrap();
	policy.auto_cleanup = false;
	harness.core.cache.set_policy(&policy).await.unwrap();

	harness.core.cache.startup_cleanup().await.unwrap();
	assert!(harness.core.store.note_by_event(stale.id).await.unwrap().is_some());

	policy.auto_cleanup = true;
	harness.core.cache.set_policy(&policy).await.unwrap();

	harness.core.cache.startup_cleanup().await.unwrap();
	assert!(harness.core.store.note_by_event(stale.id).await.unwrap().is_none());

	let stamped = harness.core.cache.policy().await.unwrap();
	assert_eq!(stamped.last_cleanup_at, Some(harness.clock.now()));
}
