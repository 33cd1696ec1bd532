//! PostgreSQL connection pool
//!
//! Wraps a deadpool pool with the statement timeout applied per checkout and the
//! TLS connector chosen from `ssl_mode`.

use crate::config::schema::PostgreSQLConfig;
use crate::domain::{BridgeError, Result, StorageError};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Schema for the ledger tables and the patient-status target
const INITIAL_SCHEMA: &str = include_str!("../../../migrations/001_initial_schema.sql");

/// Pooled PostgreSQL client
pub struct PostgreSQLClient {
    pool: Pool,
    config: PostgreSQLConfig,
}

impl PostgreSQLClient {
    /// Parses the connection coordinates without opening a connection
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed connection string or an
    /// unusable TLS setup.
    pub fn parse_config(config: &PostgreSQLConfig) -> Result<tokio_postgres::Config> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_str()
            .parse()
            .map_err(|e| {
                BridgeError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        let ssl_mode = match config.ssl_mode.as_str() {
            "disable" => SslMode::Disable,
            "require" => SslMode::Require,
            _ => SslMode::Prefer,
        };
        pg_config.ssl_mode(ssl_mode);
        pg_config.application_name("ckg-bridge");
        Ok(pg_config)
    }

    /// Builds the pool; connections are opened on first checkout
    pub fn new(config: PostgreSQLConfig) -> Result<Self> {
        let pg_config = Self::parse_config(&config)?;
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = if config.ssl_mode == "disable" {
            Manager::from_config(pg_config, NoTls, manager_config)
        } else {
            let connector = native_tls::TlsConnector::builder().build().map_err(|e| {
                BridgeError::Configuration(format!("Failed to build TLS connector: {e}"))
            })?;
            Manager::from_config(pg_config, MakeTlsConnector::new(connector), manager_config)
        };

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                BridgeError::Connection(format!("Failed to create connection pool: {e}"))
            })?;

        Ok(Self { pool, config })
    }

    /// Checks out a connection and runs `SELECT 1`
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| BridgeError::Connection(format!("Connection test failed: {e}")))?;
        tracing::debug!("PostgreSQL connection test successful");
        Ok(())
    }

    /// Creates the bridge tables if they are missing
    pub async fn apply_migrations(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(INITIAL_SCHEMA)
            .await
            .map_err(|e| StorageError::query("schema", "migrate", e))?;
        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to get connection from pool: {e}")))
    }

    async fn checkout(&self, table: &str, operation: &str) -> Result<deadpool_postgres::Object> {
        let client = self.get_connection().await?;
        let timeout_query = format!(
            "SET statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        );
        client
            .batch_execute(&timeout_query)
            .await
            .map_err(|e| StorageError::query(table, operation, e))?;
        Ok(client)
    }

    /// Runs a query and returns its rows
    pub async fn query(
        &self,
        table: &str,
        operation: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let client = self.checkout(table, operation).await?;
        tracing::trace!(table, operation, sql, "Executing query");
        client
            .query(sql, params)
            .await
            .map_err(|e| StorageError::query(table, operation, e).into())
    }

    /// Runs a statement and returns the affected row count
    pub async fn execute(
        &self,
        table: &str,
        operation: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        let client = self.checkout(table, operation).await?;
        tracing::trace!(table, operation, sql, "Executing statement");
        client
            .execute(sql, params)
            .await
            .map_err(|e| StorageError::query(table, operation, e).into())
    }

    /// Connection string with credentials removed
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_str())
    }

    pub fn close(&self) {
        self.pool.close();
    }

    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

pub fn redact_connection_string(connection_string: &str) -> String {
    connection_string
        .rsplit_once('@')
        .map(|(_, host)| format!("postgresql://***@{host}"))
        .unwrap_or_else(|| "postgresql://***".to_string())
}
