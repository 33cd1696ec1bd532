//! PostgreSQL storage backend

use crate::adapters::database::traits::StorageBackend;
use crate::adapters::postgresql::client::{redact_connection_string, PostgreSQLClient};
use crate::adapters::postgresql::columns::ColumnCache;
use crate::adapters::postgresql::query::{ColumnInfo, StatementBuilder};
use crate::config::{DatabaseTarget, PostgreSQLConfig};
use crate::domain::record::format_timestamp;
use crate::domain::{BridgeError, Filter, FindOptions, Record, Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::{Number, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_postgres::types::Type;
use tokio_postgres::Row;

/// Relational variant of [`StorageBackend`]
pub struct PostgreSQLBackend {
    config: PostgreSQLConfig,
    client: OnceCell<PostgreSQLClient>,
    columns: ColumnCache,
    closed: AtomicBool,
}

impl PostgreSQLBackend {
    /// Validates the connection coordinates; the pool is built by `connect`
    pub fn new(config: PostgreSQLConfig) -> Result<Self> {
        PostgreSQLClient::parse_config(&config)?;
        Ok(Self {
            config,
            client: OnceCell::new(),
            columns: ColumnCache::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn client(&self) -> Result<&PostgreSQLClient> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Connection("PostgreSQL backend is closed".to_string()));
        }
        self.client.get().ok_or_else(|| {
            BridgeError::Connection("PostgreSQL backend is not connected".to_string())
        })
    }

    /// Creates the ledger and patient-status tables
    pub async fn apply_migrations(&self) -> Result<()> {
        self.client()?.apply_migrations().await
    }

    /// Redacted connection string for status output
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_str())
    }

    async fn table_columns(&self, table: &str) -> Result<(&PostgreSQLClient, Arc<Vec<ColumnInfo>>)> {
        let client = self.client()?;
        let columns = self.columns.columns(client, table).await?;
        Ok((client, columns))
    }
}

/// Drops fields the table has no column for
fn retain_known(table: &str, record: Record, columns: &[ColumnInfo]) -> Record {
    record
        .into_iter()
        .filter(|(field, _)| {
            let known = columns.iter().any(|c| &c.name == field);
            if !known {
                tracing::debug!(table, field = %field, "Dropping field with no matching column");
            }
            known
        })
        .collect()
}

/// Decodes one row into a record; byte columns become text
fn decode_row(table: &str, row: &Row) -> Result<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let decode_err = |e: tokio_postgres::Error| StorageError::Decode {
            table: table.to_string(),
            message: format!("column '{}': {e}", column.name()),
        };

        let value = match *column.type_() {
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)
                .map_err(decode_err)?
                .map(Value::Bool),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(idx)
                .map_err(decode_err)?
                .and_then(|f| Number::from_f64(f64::from(f)).map(Value::Number)),
            Type::FLOAT8 => row
                .try_get::<_, Option<f64>>(idx)
                .map_err(decode_err)?
                .and_then(|f| Number::from_f64(f).map(Value::Number)),
            Type::UUID => row
                .try_get::<_, Option<uuid::Uuid>>(idx)
                .map_err(decode_err)?
                .map(|u| Value::String(u.to_string())),
            Type::JSON | Type::JSONB => row
                .try_get::<_, Option<Value>>(idx)
                .map_err(decode_err)?,
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)
                .map_err(decode_err)?
                .map(|ts| Value::String(format_timestamp(&ts))),
            Type::TIMESTAMP => row
                .try_get::<_, Option<NaiveDateTime>>(idx)
                .map_err(decode_err)?
                .map(|ts| Value::String(format_timestamp(&ts.and_utc()))),
            Type::DATE => row
                .try_get::<_, Option<NaiveDate>>(idx)
                .map_err(decode_err)?
                .map(|d| Value::String(d.to_string())),
            Type::BYTEA => row
                .try_get::<_, Option<Vec<u8>>>(idx)
                .map_err(decode_err)?
                .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            _ => row
                .try_get::<_, Option<String>>(idx)
                .map_err(decode_err)?
                .map(Value::String),
        };
        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

#[async_trait]
impl StorageBackend for PostgreSQLBackend {
    fn kind(&self) -> DatabaseTarget {
        DatabaseTarget::PostgreSQL
    }

    async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Connection("PostgreSQL backend is closed".to_string()));
        }
        let client = self
            .client
            .get_or_try_init(|| async { PostgreSQLClient::new(self.config.clone()) })
            .await?;
        client.test_connection().await?;
        tracing::info!(
            connection = %client.connection_string_safe(),
            "Successfully connected to PostgreSQL"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client()?.test_connection().await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(client) = self.client.get() {
            client.close();
            tracing::info!("Disconnected from PostgreSQL");
        }
        Ok(())
    }

    async fn find(
        &self,
        table: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Record>> {
        let (client, columns) = self.table_columns(table).await?;
        let query = StatementBuilder::new(table, &columns).select(filter, options)?;
        let rows = client
            .query(table, "find", &query.sql, &query.param_refs())
            .await?;
        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    async fn find_one(
        &self,
        table: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Record> {
        let (client, columns) = self.table_columns(table).await?;
        let query = StatementBuilder::new(table, &columns).select_one(filter, options)?;
        let rows = client
            .query(table, "find_one", &query.sql, &query.param_refs())
            .await?;
        match rows.first() {
            Some(row) => decode_row(table, row),
            None => Err(BridgeError::NotFound(format!(
                "no record in '{table}' matches filter"
            ))),
        }
    }

    async fn insert_one(&self, table: &str, record: Record) -> Result<String> {
        let (client, columns) = self.table_columns(table).await?;
        let record = retain_known(table, record, &columns);
        let query = StatementBuilder::new(table, &columns).insert(&record)?;
        let rows = client
            .query(table, "insert_one", &query.sql, &query.param_refs())
            .await?;
        let id = match rows.first() {
            Some(row) => row
                .try_get::<_, Option<String>>(0)
                .map_err(|e| StorageError::query(table, "insert_one", e))?
                .unwrap_or_default(),
            None => String::new(),
        };
        Ok(id)
    }

    async fn update_one(&self, table: &str, filter: &Filter, fields: Record) -> Result<u64> {
        let (client, columns) = self.table_columns(table).await?;
        let fields = retain_known(table, fields, &columns);
        let query = StatementBuilder::new(table, &columns).update_one(filter, &fields)?;
        client
            .execute(table, "update_one", &query.sql, &query.param_refs())
            .await
    }

    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<u64> {
        let (client, columns) = self.table_columns(table).await?;
        let query = StatementBuilder::new(table, &columns).delete_one(filter)?;
        client
            .execute(table, "delete_one", &query.sql, &query.param_refs())
            .await
    }

    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64> {
        let (client, columns) = self.table_columns(table).await?;
        let query = StatementBuilder::new(table, &columns).delete_many(filter)?;
        client
            .execute(table, "delete_many", &query.sql, &query.param_refs())
            .await
    }
}
