//! Region and facility registry lookups

use crate::adapters::database::StorageBackend;
use crate::domain::screening::{FacilityRecord, RegionCode, RegionRecord};
use crate::domain::record::from_record;
use crate::domain::{Filter, FindOptions, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolves region and facility codes against the reference tables
///
/// With caching on, every resolved region also warms the cache with its ancestor
/// levels so sibling codes resolve without another round trip for the parents.
pub struct ReferenceResolver {
    storage: Arc<dyn StorageBackend>,
    region_table: String,
    facility_table: String,
    use_cache: bool,
    regions: Mutex<HashMap<String, RegionRecord>>,
    facilities: Mutex<HashMap<String, FacilityRecord>>,
}

impl ReferenceResolver {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        region_table: impl Into<String>,
        facility_table: impl Into<String>,
        use_cache: bool,
    ) -> Self {
        Self {
            storage,
            region_table: region_table.into(),
            facility_table: facility_table.into(),
            use_cache,
            regions: Mutex::new(HashMap::new()),
            facilities: Mutex::new(HashMap::new()),
        }
    }

    fn cached_region(&self, digits: &str) -> Option<RegionRecord> {
        if !self.use_cache {
            return None;
        }
        self.regions.lock().ok()?.get(digits).cloned()
    }

    fn cache_region(&self, digits: &str, record: &RegionRecord) {
        if !self.use_cache {
            return;
        }
        if let Ok(mut regions) = self.regions.lock() {
            regions.insert(digits.to_string(), record.clone());
        }
    }

    async fn lookup_region(&self, code: &RegionCode) -> Result<Option<RegionRecord>> {
        let filter = Filter::new().eq("id", code.dotted());
        match self
            .storage
            .find_one(&self.region_table, &filter, &FindOptions::new())
            .await
        {
            Ok(record) => Ok(Some(from_record(record)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Region row for a code such as `3201010001` or `32.01`
    pub async fn region(&self, code: &str) -> Result<Option<RegionRecord>> {
        let root = RegionCode::parse(code);
        if let Some(hit) = self.cached_region(&root.digits) {
            return Ok(Some(hit));
        }

        let Some(record) = self.lookup_region(&root).await? else {
            return Ok(None);
        };
        self.cache_region(&root.digits, &record);

        if self.use_cache {
            for ancestor in root.ancestors() {
                if self.cached_region(&ancestor.digits).is_some() {
                    continue;
                }
                match self.lookup_region(&ancestor).await {
                    Ok(Some(parent)) => self.cache_region(&ancestor.digits, &parent),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(code = %ancestor.dotted(), error = %e, "Parent region lookup failed");
                    }
                }
            }
        }

        Ok(Some(record))
    }

    /// Facility row by its SATUSEHAT code
    pub async fn facility(&self, code: &str) -> Result<Option<FacilityRecord>> {
        if self.use_cache {
            if let Some(hit) = self.facilities.lock().ok().and_then(|f| f.get(code).cloned()) {
                return Ok(Some(hit));
            }
        }

        let filter = Filter::new().eq("kode_satusehat", code);
        let record: FacilityRecord = match self
            .storage
            .find_one(&self.facility_table, &filter, &FindOptions::new())
            .await
        {
            Ok(record) => from_record(record)?,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if self.use_cache {
            if let Ok(mut facilities) = self.facilities.lock() {
                facilities.insert(code.to_string(), record.clone());
            }
        }
        Ok(Some(record))
    }
}
