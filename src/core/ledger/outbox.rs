//! Outbound message ledger and export watermark

use crate::adapters::database::StorageBackend;
use crate::core::ledger::known_ids;
use crate::domain::record::{format_timestamp, non_empty_str, parse_timestamp};
use crate::domain::{Filter, FindOptions, OutboxEntry, Persisted, Record, Result, Sort};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub struct OutboxLedger {
    storage: Arc<dyn StorageBackend>,
    table: String,
}

impl OutboxLedger {
    pub fn new(storage: Arc<dyn StorageBackend>, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Latest `created_at` across all entries; `None` when nothing was exported yet
    pub async fn last_export_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let options = FindOptions::new()
            .columns(["created_at"])
            .sort(Sort::new().desc("created_at"));
        match self
            .storage
            .find_one(&self.table, &Filter::new(), &options)
            .await
        {
            Ok(record) => match non_empty_str(&record, "created_at") {
                Some(raw) => Ok(Some(parse_timestamp(raw)?)),
                None => Ok(None),
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upsert by id: refreshes `updated_at` on an existing entry, inserts otherwise
    ///
    /// Two publishers racing on the same id resolve as last write wins.
    pub async fn record_published(&self, entry: &OutboxEntry) -> Result<()> {
        let by_id = Filter::new().eq("id", entry.id.as_str());
        let options = FindOptions::new().columns(["id"]);
        match self.storage.find_one(&self.table, &by_id, &options).await {
            Ok(_) => {
                let updated_at = entry.updated_at.unwrap_or_else(Utc::now);
                let mut fields = Record::new();
                fields.insert(
                    "updated_at".to_string(),
                    Value::String(format_timestamp(&updated_at)),
                );
                self.storage.update_one(&self.table, &by_id, fields).await?;
                tracing::debug!(message_id = %entry.id, "Outbox entry refreshed");
            }
            Err(e) if e.is_not_found() => {
                self.storage.insert_one(&self.table, entry.to_row()?).await?;
                tracing::debug!(message_id = %entry.id, "Outbox entry recorded");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Subset of `ids` already published; empty when the lookup fails
    pub async fn existing_ids(&self, ids: &[String]) -> HashSet<String> {
        known_ids(self.storage.as_ref(), &self.table, ids).await
    }
}
