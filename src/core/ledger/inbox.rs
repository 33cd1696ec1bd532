//! Inbound message ledger

use crate::adapters::database::StorageBackend;
use crate::core::ledger::known_ids;
use crate::domain::record::format_timestamp;
use crate::domain::{Filter, InboxEntry, Persisted, Record, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub struct InboxLedger {
    storage: Arc<dyn StorageBackend>,
    table: String,
}

impl InboxLedger {
    pub fn new(storage: Arc<dyn StorageBackend>, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Subset of `ids` already seen; empty when the lookup fails
    pub async fn existing_ids(&self, ids: &[String]) -> HashSet<String> {
        known_ids(self.storage.as_ref(), &self.table, ids).await
    }

    /// Records the first sighting of a message id
    pub async fn record_new(&self, entry: &InboxEntry) -> Result<()> {
        self.storage.insert_one(&self.table, entry.to_row()?).await?;
        tracing::debug!(message_id = %entry.id, "Inbox entry recorded");
        Ok(())
    }

    /// Sets `processed_at` once the domain write succeeded
    pub async fn mark_processed(&self, id: &str, processed_at: DateTime<Utc>) -> Result<()> {
        let mut fields = Record::new();
        fields.insert(
            "processed_at".to_string(),
            Value::String(format_timestamp(&processed_at)),
        );
        let matched = self
            .storage
            .update_one(&self.table, &Filter::new().eq("id", id), fields)
            .await?;
        if matched == 0 {
            tracing::warn!(message_id = %id, "No inbox entry to mark as processed");
        }
        Ok(())
    }

    /// Retention sweep; deletes entries received before `cutoff`
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let filter = Filter::new().lt("received_at", format_timestamp(&cutoff));
        let deleted = self.storage.delete_many(&self.table, &filter).await?;
        tracing::info!(table = %self.table, deleted, cutoff = %format_timestamp(&cutoff), "Inbox sweep complete");
        Ok(deleted)
    }
}
