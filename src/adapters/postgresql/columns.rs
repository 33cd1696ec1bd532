//! Per-table column cache
//!
//! Columns are introspected from `information_schema` the first time a table is
//! touched and kept for the life of the process.

use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::query::ColumnInfo;
use crate::domain::{Result, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const INTROSPECT_SQL: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

#[derive(Default)]
pub struct ColumnCache {
    tables: RwLock<HashMap<String, Arc<Vec<ColumnInfo>>>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached columns for `table`, introspecting on first use
    pub async fn columns(
        &self,
        client: &PostgreSQLClient,
        table: &str,
    ) -> Result<Arc<Vec<ColumnInfo>>> {
        if let Some(columns) = self.tables.read().await.get(table) {
            return Ok(columns.clone());
        }

        let rows = client
            .query(table, "introspect", INTROSPECT_SQL, &[&table])
            .await?;
        if rows.is_empty() {
            return Err(StorageError::query(table, "introspect", "table does not exist").into());
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get(0)
                .map_err(|e| StorageError::query(table, "introspect", e))?;
            let data_type: String = row
                .try_get(1)
                .map_err(|e| StorageError::query(table, "introspect", e))?;
            columns.push(ColumnInfo::new(name, data_type));
        }
        tracing::debug!(table, columns = columns.len(), "Introspected table columns");

        let columns = Arc::new(columns);
        // A concurrent introspection of the same table may have won; either result is identical
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_insert_with(|| columns.clone());
        Ok(columns)
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, table: &str, columns: Vec<ColumnInfo>) {
        self.tables
            .write()
            .await
            .insert(table.to_string(), Arc::new(columns));
    }
}
