//! Integration tests for the patient-status upsert

mod common;

use ckg_bridge::core::transform::patient_status::{MSG_INSERTED, MSG_UPDATED};
use ckg_bridge::core::transform::{InboundHandler, PatientStatusHandler};
use ckg_bridge::domain::{BridgeError, PatientStatus};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn handler(storage: &Arc<MemoryStorage>) -> PatientStatusHandler {
    PatientStatusHandler::new(storage.clone(), PATIENT_STATUS, SCREENING)
}

fn item(terduga_id: &str, nik: &str) -> PatientStatus {
    PatientStatus {
        terduga_id: Some(terduga_id.to_string()),
        pasien_nik: Some(nik.to_string()),
        ..PatientStatus::default()
    }
}

#[tokio::test]
async fn test_new_status_is_enriched_from_screening() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(
        SCREENING,
        vec![record(json!({"pasien_id": "CKG-77", "nik": "3201010101010001"}))],
    );

    let outcome = handler(&storage)
        .upsert(0, item("T-1", "3201010101010001"))
        .await;

    assert!(!outcome.is_error, "{}", outcome.respons);
    assert_eq!(outcome.respons, MSG_INSERTED);
    assert_eq!(outcome.pasien_ckg_id.as_deref(), Some("CKG-77"));

    let rows = storage.rows(PATIENT_STATUS);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["pasien_ckg_id"], json!("CKG-77"));
    assert_eq!(rows[0]["terduga_id"], json!("T-1"));
}

#[tokio::test]
async fn test_supplied_ckg_id_is_kept_on_insert() {
    let storage = Arc::new(MemoryStorage::new());
    let mut status = item("T-1", "3201010101010001");
    status.pasien_ckg_id = Some("CKG-1".to_string());

    let outcome = handler(&storage).upsert(0, status).await;

    assert_eq!(outcome.respons, MSG_INSERTED);
    assert_eq!(storage.rows(PATIENT_STATUS)[0]["pasien_ckg_id"], json!("CKG-1"));
}

#[tokio::test]
async fn test_existing_status_is_updated_and_keeps_tb_id() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(
        PATIENT_STATUS,
        vec![record(json!({
            "pasien_ckg_id": "CKG-5",
            "terduga_id": "T-5",
            "pasien_tb_id": "TB-5",
            "pasien_nik": "3201010101010005",
            "status_diagnosa": "TBC SO",
        }))],
    );

    let mut status = item("T-5", "3201010101010005");
    status.hasil_akhir = Some("Sembuh".to_string());
    let outcome = handler(&storage).upsert(0, status).await;

    assert_eq!(outcome.respons, MSG_UPDATED);
    assert_eq!(outcome.pasien_ckg_id.as_deref(), Some("CKG-5"));
    assert_eq!(outcome.pasien_tb_id.as_deref(), Some("TB-5"));
    assert_eq!(storage.updates(PATIENT_STATUS), 1);
    assert_eq!(storage.inserts(PATIENT_STATUS), 0);

    let row = &storage.rows(PATIENT_STATUS)[0];
    assert_eq!(row["pasien_tb_id"], json!("TB-5"));
}

#[tokio::test]
async fn test_diagnosis_is_dropped_without_tb_id() {
    let storage = Arc::new(MemoryStorage::new());
    let mut status = item("T-2", "3201010101010002");
    status.diagnosa_lab_hasil_tcm = Some("rif_sen".to_string());
    status.hasil_akhir = Some("Sembuh".to_string());

    handler(&storage).upsert(0, status).await;

    let row = &storage.rows(PATIENT_STATUS)[0];
    assert_eq!(row["diagnosa_lab_hasil_tcm"], Value::Null);
    assert_eq!(row["hasil_akhir"], Value::Null);
}

#[tokio::test]
async fn test_invalid_items_are_reported_by_index() {
    let storage = Arc::new(MemoryStorage::new());
    let outcomes = handler(&storage)
        .apply(vec![
            record(json!({"terduga_id": "T-1", "pasien_nik": "3201"})),
            record(json!({"pasien_nik": "3202"})),
            record(json!({
                "terduga_id": "T-3",
                "pasien_nik": "3203",
                "pasien_tb_id": "TB-3",
                "status_diagnosa": "Unknown"
            })),
        ])
        .await;

    assert!(!outcomes[0].is_error);
    assert!(outcomes[1].is_error);
    assert!(outcomes[1].respons.contains("index 1"));
    assert!(outcomes[2].respons.contains("status_diagnosa"));
    assert_eq!(storage.inserts(PATIENT_STATUS), 1);
}

#[tokio::test]
async fn test_unreachable_storage_fails_the_envelope() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_unreachable(true);

    let result = handler(&storage)
        .handle(vec![record(status_item("T-1", "3201"))])
        .await;

    assert!(matches!(result, Err(BridgeError::Connection(_))));
}

#[tokio::test]
async fn test_handle_counts_accepted_and_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let report = handler(&storage)
        .handle(vec![
            record(status_item("T-1", "3201")),
            record(status_item("T-2", "3202")),
            record(json!({"terduga_id": "T-3"})),
        ])
        .await
        .unwrap();

    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.total(), 3);
}
