//! Ingestion scenarios against an in-memory store.

use chrono::{DateTime, Offset, Utc};
use rollcall_core::Direction::{Entry, Exit};
use rollcall_core::{DeviceId, Direction, EventSource, SubjectId};
use rollcall_ingest::{IngestConfig, IngestOutcome, IngestPipeline, NormalizedEvent, normalize};
use rollcall_protocol::{Payload, RawAccessEvent};
use rollcall_storage::repositories::AttendanceEventRepository;
use rollcall_storage::{Database, transaction};
use serde_json::json;
use std::sync::Arc;

async fn pipeline() -> IngestPipeline {
    let db = Database::in_memory().await.unwrap();
    IngestPipeline::new(&db, IngestConfig::default())
}

fn device(id: &str) -> DeviceId {
    DeviceId::new(id).unwrap()
}

fn event(device_id: &str, subject: &str, time: &str, serial: Option<&str>) -> NormalizedEvent {
    let raw = RawAccessEvent {
        subject: Some(subject.to_string()),
        time: Some(time.to_string()),
        serial_no: serial.map(str::to_string),
        major: Some(5),
        minor: Some(75),
        raw: json!({"employeeNoString": subject, "time": time}).to_string(),
    };
    normalize(&device(device_id), &raw, EventSource::Push, Utc.fix())
        .unwrap()
        .unwrap()
}

async fn directions(pipeline: &IngestPipeline, device_id: &str, subject: &str) -> Vec<(String, Direction)> {
    pipeline
        .events()
        .list_for_subject(&device(device_id), &SubjectId::new(subject).unwrap())
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.observed_at.format("%H:%M").to_string(), e.direction))
        .collect()
}

fn hm(pairs: &[(&str, Direction)]) -> Vec<(String, Direction)> {
    pairs.iter().map(|(t, d)| (t.to_string(), *d)).collect()
}

#[tokio::test]
async fn test_workday_alternates() {
    let p = pipeline().await;
    for (i, time) in ["09:00", "12:00", "13:00", "18:00"].into_iter().enumerate() {
        let serial = (i + 1).to_string();
        p.ingest(&event("D1", "S1", &format!("2025-03-04T{time}:00Z"), Some(&serial)))
            .await
            .unwrap();
    }

    assert_eq!(
        directions(&p, "D1", "S1").await,
        hm(&[("09:00", Entry), ("12:00", Exit), ("13:00", Entry), ("18:00", Exit)])
    );
}

#[tokio::test]
async fn test_late_event_rederives_tail() {
    let p = pipeline().await;
    p.ingest(&event("D1", "S1", "2025-03-04T09:00:00Z", Some("1"))).await.unwrap();
    p.ingest(&event("D1", "S1", "2025-03-04T12:00:00Z", Some("3"))).await.unwrap();

    let outcome = p.ingest(&event("D1", "S1", "2025-03-04T10:30:00Z", Some("2"))).await.unwrap();

    let IngestOutcome::Inserted { direction, reclassified, .. } = outcome else {
        panic!("late event must be inserted");
    };
    assert_eq!(direction, Exit);
    assert_eq!(reclassified.len(), 1);
    assert_eq!((reclassified[0].from, reclassified[0].to), (Exit, Entry));
    assert_eq!(
        directions(&p, "D1", "S1").await,
        hm(&[("09:00", Entry), ("10:30", Exit), ("12:00", Entry)])
    );
}

#[tokio::test]
async fn test_replay_creates_one_row() {
    let p = pipeline().await;
    let original = event("D1", "S1", "2025-03-04T09:00:00Z", Some("77"));
    p.ingest(&original).await.unwrap();
    p.ingest(&event("D1", "S1", "2025-03-04T12:00:00Z", Some("78"))).await.unwrap();

    for _ in 0..5 {
        let outcome = p.ingest(&original).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Duplicate { ref dedup_key } if dedup_key.as_str() == "sn:77"));
    }

    assert_eq!(p.events().count_for_device(&device("D1")).await.unwrap(), 2);
    assert_eq!(directions(&p, "D1", "S1").await, hm(&[("09:00", Entry), ("12:00", Exit)]));
}

#[tokio::test]
async fn test_replay_without_serial_uses_time_key() {
    let p = pipeline().await;
    let first = event("D1", "S1", "2025-03-04T09:00:00.250Z", None);
    p.ingest(&first).await.unwrap();
    let again = p.ingest(&event("D1", "S1", "2025-03-04T09:00:00.250Z", None)).await.unwrap();
    assert!(matches!(again, IngestOutcome::Duplicate { .. }));
}

#[tokio::test]
async fn test_devices_are_isolated() {
    let p = pipeline().await;
    p.ingest(&event("D1", "S1", "2025-03-04T09:00:00Z", Some("1"))).await.unwrap();
    p.ingest(&event("D2", "S1", "2025-03-04T10:00:00Z", Some("1"))).await.unwrap();
    p.ingest(&event("D1", "S1", "2025-03-04T11:00:00Z", Some("2"))).await.unwrap();

    assert_eq!(directions(&p, "D1", "S1").await, hm(&[("09:00", Entry), ("11:00", Exit)]));
    assert_eq!(directions(&p, "D2", "S1").await, hm(&[("10:00", Entry)]));
}

#[tokio::test]
async fn test_same_instant_orders_after_existing() {
    let p = pipeline().await;
    p.ingest(&event("D1", "S1", "2025-03-04T09:00:00Z", Some("1"))).await.unwrap();
    let outcome = p.ingest(&event("D1", "S1", "2025-03-04T09:00:00Z", Some("2"))).await.unwrap();

    assert!(matches!(outcome, IngestOutcome::Inserted { direction: Exit, ref reclassified, .. } if reclassified.is_empty()));
}

#[tokio::test]
async fn test_concurrent_ingest_keeps_alternation() {
    let p = Arc::new(pipeline().await);
    let events: Vec<_> = (0..12)
        .rev()
        .map(|h| event("D1", "S1", &format!("2025-03-04T{:02}:00:00Z", h + 6), Some(&h.to_string())))
        .collect();

    futures::future::join_all(events.iter().map(|e| p.ingest(e))).await;

    let stored = directions(&p, "D1", "S1").await;
    assert_eq!(stored.len(), 12);
    assert_eq!(stored[0].1, Entry);
    for pair in stored.windows(2) {
        assert_ne!(pair[0].1, pair[1].1);
    }
}

#[tokio::test]
async fn test_rederive_partition_repairs_history() {
    let p = pipeline().await;
    for (i, time) in ["09:00", "12:00", "13:00"].into_iter().enumerate() {
        p.ingest(&event("D1", "S1", &format!("2025-03-04T{time}:00Z"), Some(&i.to_string())))
            .await
            .unwrap();
    }
    let stored = p
        .events()
        .list_for_subject(&device("D1"), &SubjectId::new("S1").unwrap())
        .await
        .unwrap();

    let mut tx = p.pool().begin().await.unwrap();
    transaction::update_direction(&mut tx, stored[1].id, Entry, Utc::now()).await.unwrap();
    tx.commit().await.unwrap();

    let changes = p.rederive_partition(&device("D1"), &SubjectId::new("S1").unwrap()).await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].id, stored[1].id);
    assert_eq!(
        directions(&p, "D1", "S1").await,
        hm(&[("09:00", Entry), ("12:00", Exit), ("13:00", Entry)])
    );

    assert!(p.rederive_device(&device("D1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_payload_counts() {
    let p = pipeline().await;
    let notification = Payload::Json(json!({
        "dateTime": "2025-03-04T09:00:00-03:00",
        "eventType": "AccessControllerEvent",
        "AccessControllerEvent": {"majorEventType": 5, "subEventType": 75, "employeeNoString": "S1", "serialNo": 9}
    }));

    let report = p.ingest_payload(&device("D1"), &notification).await.unwrap();
    assert_eq!((report.inserted, report.duplicates), (1, 0));
    let latest: DateTime<Utc> = report.latest.unwrap().0;
    assert_eq!(latest.to_rfc3339(), "2025-03-04T12:00:00+00:00");

    let replay = p.ingest_payload(&device("D1"), &notification).await.unwrap();
    assert_eq!((replay.inserted, replay.duplicates), (0, 1));

    let door = Payload::Json(json!({
        "dateTime": "2025-03-04T09:05:00-03:00",
        "eventType": "AccessControllerEvent",
        "AccessControllerEvent": {"majorEventType": 3, "subEventType": 1024}
    }));
    assert_eq!(p.ingest_payload(&device("D1"), &door).await.unwrap().skipped, 1);

    let heartbeat = Payload::Json(json!({"eventType": "heartBeat"}));
    assert_eq!(p.ingest_payload(&device("D1"), &heartbeat).await.unwrap(), Default::default());
}

#[tokio::test]
async fn test_malformed_event_rejected_not_fatal() {
    let p = pipeline().await;
    let raws = vec![
        RawAccessEvent {
            subject: Some("S1".to_string()),
            time: Some("not a time".to_string()),
            serial_no: Some("1".to_string()),
            major: Some(5),
            minor: Some(75),
            raw: "{}".to_string(),
        },
        RawAccessEvent {
            subject: Some("S1".to_string()),
            time: Some("2025-03-04T09:00:00Z".to_string()),
            serial_no: Some("2".to_string()),
            major: Some(5),
            minor: Some(75),
            raw: "{}".to_string(),
        },
    ];

    let report = p.ingest_raw(&device("D1"), &raws, EventSource::Pull).await.unwrap();
    assert_eq!((report.rejected, report.inserted), (1, 1));
}
