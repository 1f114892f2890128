//! Integration tests for database connection, migrations and transactions.
//!
//! Run with: cargo test --package rollcall-storage --test integration_database

use chrono::{TimeZone, Utc};
use rollcall_core::{DedupKey, DeviceId, Direction, EventSource, SubjectId};
use rollcall_storage::{Database, DatabaseConfig};
use rollcall_storage::models::NewAttendanceEvent;
use rollcall_storage::transaction;
use rstest::rstest;
use std::sync::Arc;
use tokio::sync::Barrier;

fn event(dedup: &str, hour: u32) -> NewAttendanceEvent {
    let subject = SubjectId::new("S1").unwrap();
    let observed_at = Utc.with_ymd_and_hms(2025, 3, 4, hour, 0, 0).unwrap();
    NewAttendanceEvent {
        device_id: DeviceId::new("D1").unwrap(),
        dedup_key: DedupKey::from_device_event(dedup),
        subject_id: subject,
        observed_at,
        direction: Direction::Entry,
        device_event_id: Some(dedup.to_string()),
        source: EventSource::Push,
        raw_payload: "{}".to_string(),
    }
}

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[rstest]
#[case("devices")]
#[case("enrollment_sessions")]
#[case("attendance_events")]
#[case("event_cursors")]
#[tokio::test]
async fn test_migration_idempotency(#[case] table: &str) {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
            .bind(table)
            .fetch_one(db.pool())
            .await
            .unwrap();

    assert_eq!(result.0, 1);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_writers_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(DatabaseConfig::file(dir.path().join("rollcall.db")).pool_size(4))
        .await
        .unwrap();

    const WRITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let db = db.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let mut tx = db.pool().begin().await.unwrap();
                let id = transaction::insert_event_if_absent(&mut tx, &event(&i.to_string(), 8 + i as u32))
                    .await
                    .unwrap();
                tx.commit().await.unwrap();
                id
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().is_some());
    }
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance_events")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, WRITERS as i64);
    db.close().await;
}

#[tokio::test]
async fn test_duplicate_insert_is_ignored() {
    let db = Database::in_memory().await.unwrap();

    let mut tx = db.pool().begin().await.unwrap();
    let first = transaction::insert_event_if_absent(&mut tx, &event("10", 9)).await.unwrap();
    let again = transaction::insert_event_if_absent(&mut tx, &event("10", 9)).await.unwrap();
    tx.commit().await.unwrap();

    assert!(first.is_some());
    assert!(again.is_none());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance_events")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_rolled_back_insert_leaves_no_row() {
    let db = Database::in_memory().await.unwrap();

    let mut tx = db.pool().begin().await.unwrap();
    transaction::insert_event_if_absent(&mut tx, &event("10", 9)).await.unwrap();
    tx.rollback().await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance_events")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_partition_ordering_places_ties_after_existing_rows() {
    let db = Database::in_memory().await.unwrap();
    let device = DeviceId::new("D1").unwrap();
    let subject = SubjectId::new("S1").unwrap();

    let mut tx = db.pool().begin().await.unwrap();
    let nine = transaction::insert_event_if_absent(&mut tx, &event("a", 9)).await.unwrap().unwrap();
    let twelve = transaction::insert_event_if_absent(&mut tx, &event("b", 12)).await.unwrap().unwrap();
    transaction::update_direction(&mut tx, twelve, Direction::Exit, Utc::now()).await.unwrap();

    // Same instant as the 12:00 row, inserted later
    let tie = transaction::insert_event_if_absent(&mut tx, &event("c", 12)).await.unwrap().unwrap();
    let at = Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap();

    let previous = transaction::previous_direction(&mut tx, &device, &subject, at, tie)
        .await
        .unwrap();
    assert_eq!(previous, Some(Direction::Exit));

    let tail = transaction::events_from(&mut tx, &device, &subject, at, tie).await.unwrap();
    assert_eq!(tail.iter().map(|e| e.id).collect::<Vec<_>>(), vec![tie]);

    let all = transaction::partition_events(&mut tx, &device, &subject).await.unwrap();
    assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![nine, twelve, tie]);
    tx.commit().await.unwrap();
}
