//! Screening record to published screening result

use crate::core::transform::{OutboundTransform, ReferenceResolver};
use crate::domain::record::from_record;
use crate::domain::{Record, Result, ScreeningRaw, ScreeningResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Renames a screening record, applies the outcome rule and maps region and
/// facility codes onto registry ids
///
/// Only presumptive TB cases are in scope. Registry lookups that fail leave the
/// corresponding ids as they were; they never reject the record.
pub struct ScreeningTransform {
    resolver: Arc<ReferenceResolver>,
}

impl ScreeningTransform {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }

    async fn map_registry_ids(&self, raw: &ScreeningRaw, result: &mut ScreeningResult) {
        let levels: [(&Option<String>, u8); 4] = [
            (&raw.village, 4),
            (&raw.district, 3),
            (&raw.regency, 2),
            (&raw.province, 1),
        ];

        for (code, level) in levels {
            let Some(code) = code.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            let region = match self.resolver.region(code).await {
                Ok(Some(region)) => region,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(code, error = %e, "Region lookup failed");
                    continue;
                }
            };
            match level {
                4 => {
                    result.pasien_kelurahan_satusehat = Some(code.to_string());
                    result.pasien_kelurahan_sitb = region.kelurahan_id;
                }
                3 => {
                    result.pasien_kecamatan_satusehat = Some(code.to_string());
                    result.pasien_kecamatan_sitb = region.kecamatan_id;
                }
                2 => {
                    result.pasien_kabkota_satusehat = Some(code.to_string());
                    result.pasien_kabkota_sitb = region.kabupaten_id;
                }
                _ => {
                    result.pasien_provinsi_satusehat = Some(code.to_string());
                    result.pasien_provinsi_sitb = region.provinsi_id;
                }
            }
        }

        if let Some(code) = raw.facility_code.as_deref().filter(|c| !c.is_empty()) {
            match self.resolver.facility(code).await {
                Ok(Some(facility)) => {
                    result.periksa_faskes_satusehat = Some(code.to_string());
                    result.periksa_faskes_sitb = Some(facility.id);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(code, error = %e, "Facility lookup failed"),
            }
        }
    }
}

#[async_trait]
impl OutboundTransform for ScreeningTransform {
    async fn transform(&self, record: Record) -> Result<Option<Value>> {
        let raw: ScreeningRaw = from_record(record)?;
        let mut result = ScreeningResult::from_raw(&raw);
        if !result.is_presumptive() {
            tracing::trace!(patient_id = %raw.patient_id, "Screening record not presumptive, skipped");
            return Ok(None);
        }

        self.map_registry_ids(&raw, &mut result).await;
        Ok(Some(serde_json::to_value(&result)?))
    }
}
