//! TB patient status, as reported back by the TB registry

use crate::domain::schema::{Persisted, RecordDescriptor};
use serde::{Deserialize, Serialize};

/// Accepted diagnosis statuses
pub const DIAGNOSIS_STATUSES: [&str; 3] = ["TBC SO", "TBC RO", "Bukan TBC"];

/// Accepted treatment outcomes
pub const FINAL_OUTCOMES: [&str; 7] = [
    "Sembuh",
    "Pengobatan Lengkap",
    "Pengobatan Gagal",
    "Meninggal",
    "Putus berobat (lost to follow up)",
    "Tidak dievaluasi/pindah",
    "Gagal karena Perubahan Diagnosis",
];

/// One patient status item from an inbound envelope; also the stored row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientStatus {
    pub pasien_ckg_id: Option<String>,
    pub terduga_id: Option<String>,
    pub pasien_tb_id: Option<String>,
    pub pasien_nik: Option<String>,
    pub status_diagnosa: Option<String>,
    pub diagnosa_lab_hasil_tcm: Option<String>,
    pub diagnosa_lab_hasil_bta: Option<String>,
    pub tanggal_mulai_pengobatan: Option<String>,
    pub tanggal_selesai_pengobatan: Option<String>,
    pub hasil_akhir: Option<String>,
}

impl Persisted for PatientStatus {
    const DESCRIPTOR: RecordDescriptor = RecordDescriptor {
        name: "patient_status",
        key: "terduga_id",
        columns: &[
            "pasien_ckg_id",
            "terduga_id",
            "pasien_tb_id",
            "pasien_nik",
            "status_diagnosa",
            "diagnosa_lab_hasil_tcm",
            "diagnosa_lab_hasil_bta",
            "tanggal_mulai_pengobatan",
            "tanggal_selesai_pengobatan",
            "hasil_akhir",
        ],
    };
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl PatientStatus {
    /// Validates the item at position `index` of its envelope
    ///
    /// # Errors
    ///
    /// Returns a message naming the index and the offending field.
    pub fn validate(&self, index: usize) -> Result<(), String> {
        if !filled(&self.terduga_id) {
            return Err(format!(
                "validation error at index {index}: terduga_id is required"
            ));
        }
        if !filled(&self.pasien_nik) {
            return Err(format!(
                "validation error at index {index}: pasien_nik is required"
            ));
        }

        if self.pasien_tb_id.is_some() {
            let known = self
                .status_diagnosa
                .as_deref()
                .is_some_and(|s| DIAGNOSIS_STATUSES.contains(&s));
            if !known {
                return Err(format!(
                    "validation error at index {index}: status_diagnosa must be one of {DIAGNOSIS_STATUSES:?} when pasien_tb_id is provided"
                ));
            }
        }

        if let Some(outcome) = self.hasil_akhir.as_deref() {
            if !FINAL_OUTCOMES.contains(&outcome) {
                return Err(format!(
                    "validation error at index {index}: hasil_akhir must be one of {FINAL_OUTCOMES:?}"
                ));
            }
        }

        Ok(())
    }

    /// Clears diagnosis fields that must not be stored
    ///
    /// Diagnosis data is only kept for registered TB patients with a status;
    /// empty lab results are stored as null.
    pub fn normalize(&mut self) {
        if filled(&self.pasien_tb_id) && filled(&self.status_diagnosa) {
            if !filled(&self.diagnosa_lab_hasil_tcm) {
                self.diagnosa_lab_hasil_tcm = None;
            }
            if !filled(&self.diagnosa_lab_hasil_bta) {
                self.diagnosa_lab_hasil_bta = None;
            }
        } else {
            self.status_diagnosa = None;
            self.diagnosa_lab_hasil_tcm = None;
            self.diagnosa_lab_hasil_bta = None;
            self.tanggal_mulai_pengobatan = None;
            self.tanggal_selesai_pengobatan = None;
            self.hasil_akhir = None;
        }
    }

    pub fn has_ckg_id(&self) -> bool {
        filled(&self.pasien_ckg_id)
    }

    pub fn has_tb_id(&self) -> bool {
        filled(&self.pasien_tb_id)
    }
}

/// Outcome of one patient status item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusOutcome {
    pub pasien_ckg_id: Option<String>,
    pub terduga_id: Option<String>,
    pub pasien_tb_id: Option<String>,
    pub pasien_nik: Option<String>,
    pub is_error: bool,
    pub respons: String,
}

impl StatusOutcome {
    pub fn for_item(item: &PatientStatus) -> Self {
        Self {
            pasien_ckg_id: item.pasien_ckg_id.clone(),
            terduga_id: item.terduga_id.clone(),
            pasien_tb_id: item.pasien_tb_id.clone(),
            pasien_nik: item.pasien_nik.clone(),
            is_error: false,
            respons: String::new(),
        }
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.is_error = true;
        self.respons = message.into();
        self
    }

    pub fn succeeded(mut self, message: impl Into<String>) -> Self {
        self.is_error = false;
        self.respons = message.into();
        self
    }
}
