//! TB patient status upsert

use crate::adapters::database::StorageBackend;
use crate::core::transform::{HandlerReport, InboundHandler};
use crate::domain::record::{from_record, non_empty_str};
use crate::domain::{
    BridgeError, Filter, FindOptions, PatientStatus, Persisted, Record, Result, StatusOutcome,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const MSG_UPDATED: &str = "tb patient status updated successfully";
pub const MSG_INSERTED: &str = "new tb patient status added successfully";
pub const MSG_UPDATE_FAILED: &str = "failed to update tb patient status";

/// Writes patient statuses into the patient-status table
///
/// An existing row is found by `pasien_ckg_id`, or by `terduga_id` or
/// `pasien_nik` when the item has no CKG id. A missing CKG id is filled in from
/// the screening table by NIK, and a previously stored TB id is kept when the
/// item omits it.
pub struct PatientStatusHandler {
    storage: Arc<dyn StorageBackend>,
    status_table: String,
    screening_table: String,
}

impl PatientStatusHandler {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        status_table: impl Into<String>,
        screening_table: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            status_table: status_table.into(),
            screening_table: screening_table.into(),
        }
    }

    fn lookup_filter(item: &PatientStatus) -> Option<Filter> {
        let mut alternatives = Vec::new();
        if let Some(ckg_id) = item.pasien_ckg_id.as_deref().filter(|s| !s.is_empty()) {
            alternatives.push(Filter::new().eq("pasien_ckg_id", ckg_id));
        } else {
            if let Some(terduga) = item.terduga_id.as_deref().filter(|s| !s.is_empty()) {
                alternatives.push(Filter::new().eq("terduga_id", terduga));
            }
            if let Some(nik) = item.pasien_nik.as_deref().filter(|s| !s.is_empty()) {
                alternatives.push(Filter::new().eq("pasien_nik", nik));
            }
        }
        (!alternatives.is_empty()).then(|| Filter::new().or(alternatives))
    }

    /// CKG patient id of the screening record with this NIK
    async fn ckg_id_for_nik(&self, nik: &str) -> Result<Option<String>> {
        let filter = Filter::new().eq("nik", nik);
        let options = FindOptions::new().columns(["pasien_id"]);
        match self
            .storage
            .find_one(&self.screening_table, &filter, &options)
            .await
        {
            Ok(record) => Ok(record.get("pasien_id").and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn update_fields(item: &PatientStatus) -> Record {
        let mut fields = Record::new();
        let mut set = |name: &str, value: &Option<String>| {
            fields.insert(
                name.to_string(),
                value.clone().map(Value::String).unwrap_or(Value::Null),
            );
        };
        set("status_diagnosa", &item.status_diagnosa);
        set("diagnosa_lab_hasil_tcm", &item.diagnosa_lab_hasil_tcm);
        set("diagnosa_lab_hasil_bta", &item.diagnosa_lab_hasil_bta);
        set("tanggal_mulai_pengobatan", &item.tanggal_mulai_pengobatan);
        set("tanggal_selesai_pengobatan", &item.tanggal_selesai_pengobatan);
        set("hasil_akhir", &item.hasil_akhir);

        for (name, value) in [
            ("pasien_ckg_id", &item.pasien_ckg_id),
            ("terduga_id", &item.terduga_id),
            ("pasien_nik", &item.pasien_nik),
            ("pasien_tb_id", &item.pasien_tb_id),
        ] {
            if let Some(v) = value.as_deref().filter(|s| !s.is_empty()) {
                fields.insert(name.to_string(), Value::String(v.to_string()));
            }
        }
        fields
    }

    /// Upserts one item and reports what happened to it
    pub async fn upsert(&self, index: usize, mut item: PatientStatus) -> StatusOutcome {
        let outcome = StatusOutcome::for_item(&item);
        if let Err(message) = item.validate(index) {
            return outcome.failed(message);
        }

        let Some(filter) = Self::lookup_filter(&item) else {
            return outcome.failed(format!(
                "validation error at index {index}: no identifier to match on"
            ));
        };

        let existing = match self
            .storage
            .find_one(&self.status_table, &filter, &FindOptions::new())
            .await
        {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(index, error = %e, "Patient status lookup failed");
                return outcome.failed(e.to_string());
            }
        };

        match existing {
            Some(stored) => self.update_existing(item, stored, filter, outcome).await,
            None => {
                if let Some(nik) = item.pasien_nik.clone().filter(|_| !item.has_ckg_id()) {
                    item.pasien_ckg_id = match self.ckg_id_for_nik(&nik).await {
                        Ok(found) => found,
                        Err(e) => return outcome.failed(e.to_string()),
                    };
                }
                self.insert_new(item, outcome).await
            }
        }
    }

    async fn update_existing(
        &self,
        mut item: PatientStatus,
        stored: Record,
        filter: Filter,
        mut outcome: StatusOutcome,
    ) -> StatusOutcome {
        match non_empty_str(&stored, "pasien_ckg_id") {
            Some(ckg_id) => outcome.pasien_ckg_id = Some(ckg_id.to_string()),
            None => {
                if let Some(nik) = item.pasien_nik.clone().filter(|n| !n.is_empty()) {
                    match self.ckg_id_for_nik(&nik).await {
                        Ok(Some(ckg_id)) => {
                            item.pasien_ckg_id = Some(ckg_id.clone());
                            outcome.pasien_ckg_id = Some(ckg_id);
                        }
                        Ok(None) => {}
                        Err(e) => return outcome.failed(e.to_string()),
                    }
                }
            }
        }

        if item.pasien_tb_id.is_none() {
            if let Some(tb_id) = non_empty_str(&stored, "pasien_tb_id") {
                item.pasien_tb_id = Some(tb_id.to_string());
                outcome.pasien_tb_id = Some(tb_id.to_string());
            }
        }

        item.normalize();
        match self
            .storage
            .update_one(&self.status_table, &filter, Self::update_fields(&item))
            .await
        {
            Ok(_) => outcome.succeeded(MSG_UPDATED),
            Err(e) => {
                tracing::warn!(error = %e, "Patient status update failed");
                outcome.failed(MSG_UPDATE_FAILED)
            }
        }
    }

    async fn insert_new(&self, mut item: PatientStatus, mut outcome: StatusOutcome) -> StatusOutcome {
        outcome.pasien_ckg_id = item.pasien_ckg_id.clone();
        item.normalize();
        let row = match item.to_row() {
            Ok(row) => row,
            Err(e) => return outcome.failed(e.to_string()),
        };
        match self.storage.insert_one(&self.status_table, row).await {
            Ok(_) => outcome.succeeded(MSG_INSERTED),
            Err(e) => outcome.failed(e.to_string()),
        }
    }

    /// Upserts every item, in order
    pub async fn apply(&self, items: Vec<Record>) -> Vec<StatusOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, record) in items.into_iter().enumerate() {
            let outcome = match from_record::<PatientStatus>(record) {
                Ok(item) => self.upsert(index, item).await,
                Err(e) => StatusOutcome::for_item(&PatientStatus::default())
                    .failed(format!("validation error at index {index}: {e}")),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[async_trait]
impl InboundHandler for PatientStatusHandler {
    async fn handle(&self, items: Vec<Record>) -> Result<HandlerReport> {
        // Fail the whole envelope while storage is unreachable so it is retried
        self.storage.ping().await.map_err(|e| match e {
            BridgeError::Connection(_) => e,
            other => BridgeError::Connection(other.to_string()),
        })?;

        let outcomes = self.apply(items).await;
        let mut report = HandlerReport::default();
        for outcome in &outcomes {
            if outcome.is_error {
                report.rejected += 1;
                tracing::warn!(
                    terduga_id = outcome.terduga_id.as_deref().unwrap_or(""),
                    respons = %outcome.respons,
                    "Patient status rejected"
                );
            } else {
                report.accepted += 1;
                tracing::debug!(
                    terduga_id = outcome.terduga_id.as_deref().unwrap_or(""),
                    respons = %outcome.respons,
                    "Patient status stored"
                );
            }
        }
        Ok(report)
    }
}
