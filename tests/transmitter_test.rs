//! Integration tests for the transmitter: export windows, chunking, rate-limit
//! pauses and change-event publishing

mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use ckg_bridge::adapters::database::ChangeOperation;
use ckg_bridge::config::ProducerMode;
use ckg_bridge::core::ledger::OutboxLedger;
use ckg_bridge::core::transform::{ReferenceResolver, ScreeningTransform};
use ckg_bridge::core::transmitter::{ChangeOutcome, Transmitter, TransmitterSettings};
use ckg_bridge::domain::record::format_timestamp;
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn transmitter_with(
    storage: Arc<MemoryStorage>,
    bus: Arc<FakeBus>,
    settings: TransmitterSettings,
) -> Transmitter {
    let resolver = Arc::new(ReferenceResolver::new(
        storage.clone(),
        "master_wilayah",
        "master_faskes",
        true,
    ));
    let outbox = Arc::new(OutboxLedger::new(storage.clone(), OUTBOX));
    Transmitter::new(
        storage,
        bus,
        outbox,
        Arc::new(ScreeningTransform::new(resolver)),
        settings,
    )
}

fn transmitter(storage: Arc<MemoryStorage>, bus: Arc<FakeBus>) -> Transmitter {
    transmitter_with(storage, bus, transmitter_settings())
}

/// `count` presumptive rows spread over the last hour
fn recent_rows(count: usize) -> Vec<ckg_bridge::domain::Record> {
    let now = Utc::now();
    (0..count)
        .map(|n| screening_row(&format!("P-{n:03}"), now - ChronoDuration::seconds(3600 - n as i64), true))
        .collect()
}

#[tokio::test]
async fn test_records_are_published_in_chunks() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(SCREENING, recent_rows(25));
    let bus = Arc::new(FakeBus::new());
    let (_tx, mut shutdown) = watch::channel(false);

    let summary = transmitter(storage.clone(), bus.clone())
        .export_once(&mut shutdown)
        .await
        .unwrap();

    let sizes: Vec<usize> = bus.published_items().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(summary.records_found, 25);
    assert_eq!(summary.published, 25);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.pauses, 0);
    assert!(summary.is_successful());
    assert_eq!(storage.rows(OUTBOX).len(), 3);
}

#[tokio::test]
async fn test_published_items_follow_source_order() {
    let storage = Arc::new(MemoryStorage::new());
    let mut rows = recent_rows(3);
    rows.reverse();
    storage.seed(SCREENING, rows);
    let bus = Arc::new(FakeBus::new());
    let (_tx, mut shutdown) = watch::channel(false);

    transmitter(storage, bus.clone())
        .export_once(&mut shutdown)
        .await
        .unwrap();

    let ids: Vec<String> = bus.published_items()[0]
        .iter()
        .map(|item| item["pasien_ckg_id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["P-000", "P-001", "P-002"]);
}

#[tokio::test]
async fn test_pause_after_every_tenth_chunk() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(SCREENING, recent_rows(105));
    let bus = Arc::new(FakeBus::new());
    let (_tx, mut shutdown) = watch::channel(false);

    let summary = transmitter(storage, bus.clone())
        .export_once(&mut shutdown)
        .await
        .unwrap();

    assert_eq!(summary.chunks, 11);
    assert_eq!(summary.pauses, 1);
    assert_eq!(bus.published().len(), 11);
}

#[tokio::test]
async fn test_out_of_scope_records_are_skipped() {
    let storage = Arc::new(MemoryStorage::new());
    let now = Utc::now();
    storage.seed(
        SCREENING,
        vec![
            screening_row("P-1", now - ChronoDuration::minutes(10), true),
            screening_row("P-2", now - ChronoDuration::minutes(9), false),
        ],
    );
    let bus = Arc::new(FakeBus::new());
    let (_tx, mut shutdown) = watch::channel(false);

    let summary = transmitter(storage, bus.clone())
        .export_once(&mut shutdown)
        .await
        .unwrap();

    assert_eq!(summary.records_found, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.published, 1);
}

#[tokio::test]
async fn test_envelope_and_attributes() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(SCREENING, recent_rows(1));
    let bus = Arc::new(FakeBus::new());
    let mut settings = transmitter_settings();
    settings.ordering_key = Some("ckg-tb".to_string());
    settings
        .attributes
        .insert("source".to_string(), "ckg".to_string());
    let (_tx, mut shutdown) = watch::channel(false);

    transmitter_with(storage, bus.clone(), settings)
        .export_once(&mut shutdown)
        .await
        .unwrap();

    let message = &bus.published()[0];
    let envelope: serde_json::Value = serde_json::from_slice(&message.data).unwrap();
    assert_eq!(envelope[MARKER_FIELD], json!(MARKER_PRODUCE));
    assert_eq!(envelope["data"][0]["terduga_tb"], json!("Ya"));
    assert_eq!(message.attributes["environment"], "staging");
    assert_eq!(message.attributes["source"], "ckg");
    assert!(message.attributes.contains_key("timestamp"));
    assert!(!message.attributes.contains_key("operation_type"));
    assert_eq!(message.ordering_key.as_deref(), Some("ckg-tb"));
}

#[tokio::test]
async fn test_empty_outbox_uses_lookback() {
    let storage = Arc::new(MemoryStorage::new());
    let bus = Arc::new(FakeBus::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    let (start, end) = transmitter(storage, bus).export_window(now).await.unwrap();

    assert_eq!(start, now - ChronoDuration::hours(48));
    assert_eq!(end, now);
}

#[tokio::test]
async fn test_watermark_is_latest_outbox_entry() {
    let storage = Arc::new(MemoryStorage::new());
    let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let t3 = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    storage.seed(
        OUTBOX,
        [("b", t2), ("c", t3), ("a", t1)]
            .iter()
            .map(|(id, at)| record(json!({"id": id, "created_at": format_timestamp(at)})))
            .collect(),
    );

    let outbox = OutboxLedger::new(storage.clone(), OUTBOX);
    assert_eq!(outbox.last_export_watermark().await.unwrap(), Some(t3));

    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let (start, _) = transmitter(storage, Arc::new(FakeBus::new()))
        .export_window(now)
        .await
        .unwrap();
    assert_eq!(start, t3);
}

#[tokio::test]
async fn test_records_before_watermark_are_not_exported_again() {
    let storage = Arc::new(MemoryStorage::new());
    let now = Utc::now();
    storage.seed(
        OUTBOX,
        vec![record(json!({
            "id": "earlier",
            "created_at": format_timestamp(&(now - ChronoDuration::hours(1)))
        }))],
    );
    storage.seed(
        SCREENING,
        vec![
            screening_row("OLD", now - ChronoDuration::hours(2), true),
            screening_row("NEW", now - ChronoDuration::minutes(30), true),
        ],
    );
    let bus = Arc::new(FakeBus::new());
    let (_tx, mut shutdown) = watch::channel(false);

    let summary = transmitter(storage.clone(), bus.clone())
        .export_once(&mut shutdown)
        .await
        .unwrap();

    assert_eq!(summary.published, 1);
    assert_eq!(bus.published_items()[0][0]["pasien_ckg_id"], json!("NEW"));
    assert_eq!(storage.rows(OUTBOX).len(), 2);
}

#[tokio::test]
async fn test_publish_failure_counts_chunk_as_failed() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(SCREENING, recent_rows(12));
    let bus = Arc::new(FakeBus::new());
    bus.set_fail_publish(true);
    let (_tx, mut shutdown) = watch::channel(false);

    let summary = transmitter(storage.clone(), bus)
        .export_once(&mut shutdown)
        .await
        .unwrap();

    assert_eq!(summary.failed, 12);
    assert_eq!(summary.published, 0);
    assert!(!summary.is_successful());
    assert!(storage.rows(OUTBOX).is_empty());
}

#[tokio::test]
async fn test_mode_resolution() {
    let bus = Arc::new(FakeBus::new());
    let plain = transmitter(Arc::new(MemoryStorage::new()), bus.clone());
    assert_eq!(plain.resolve_mode(ProducerMode::Auto).unwrap(), ProducerMode::Poll);
    assert_eq!(plain.resolve_mode(ProducerMode::Poll).unwrap(), ProducerMode::Poll);
    assert!(plain.resolve_mode(ProducerMode::Watch).is_err());

    let storage = Arc::new(MemoryStorage::with_feed(Arc::new(FakeFeedSource::new())));
    let watching = transmitter(storage, bus);
    assert_eq!(watching.resolve_mode(ProducerMode::Auto).unwrap(), ProducerMode::Watch);
    assert_eq!(watching.resolve_mode(ProducerMode::Poll).unwrap(), ProducerMode::Poll);
}

#[tokio::test]
async fn test_change_events() {
    let storage = Arc::new(MemoryStorage::new());
    let bus = Arc::new(FakeBus::new());
    let transmitter = transmitter(storage.clone(), bus.clone());
    let now = Utc::now();

    let deleted = transmitter
        .handle_change(change(ChangeOperation::from_name("delete"), None))
        .await;
    assert!(matches!(deleted, ChangeOutcome::Discarded(_)));

    let negative = transmitter
        .handle_change(change(
            ChangeOperation::Update,
            Some(screening_row("P-1", now, false)),
        ))
        .await;
    assert_eq!(negative, ChangeOutcome::Discarded("out of scope".to_string()));

    let inserted = transmitter
        .handle_change(change(
            ChangeOperation::Insert,
            Some(screening_row("P-2", now, true)),
        ))
        .await;
    assert_eq!(inserted, ChangeOutcome::Published("msg-1".to_string()));

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].attributes["operation_type"], "insert");
    assert_eq!(bus.published_items()[0].len(), 1);
    assert_eq!(storage.rows(OUTBOX)[0]["id"], json!("msg-1"));
}

#[tokio::test]
async fn test_watch_mode_publishes_feed_events() {
    let source = Arc::new(FakeFeedSource::new());
    let now = Utc::now();
    source.script(vec![
        Ok(Some(change(ChangeOperation::Insert, Some(screening_row("P-1", now, true))))),
        Ok(Some(change(ChangeOperation::from_name("delete"), None))),
        Ok(Some(change(ChangeOperation::Replace, Some(screening_row("P-2", now, true))))),
    ]);
    let storage = Arc::new(MemoryStorage::with_feed(source.clone()));
    let bus = Arc::new(FakeBus::new());
    let transmitter = transmitter(storage, bus.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(async move { transmitter.run(ProducerMode::Auto, shutdown_rx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.published().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("change events were not published");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("transmitter did not stop")
        .unwrap()
        .unwrap();

    let operations: Vec<String> = bus
        .published()
        .iter()
        .map(|m| m.attributes["operation_type"].clone())
        .collect();
    assert_eq!(operations, vec!["insert", "replace"]);
    assert_eq!(source.opened(), 1);
    assert_eq!(source.closed(), 1);
}
