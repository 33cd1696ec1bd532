//! Storage backend factory

use crate::adapters::database::traits::StorageBackend;
use crate::adapters::mongodb::MongoBackend;
use crate::adapters::postgresql::PostgreSQLBackend;
use crate::config::schema::{BridgeConfig, DatabaseTarget};
use crate::domain::{BridgeError, Result};
use std::sync::Arc;

/// Creates the backend selected by `database_target`
///
/// The backend is not connected yet; callers run
/// [`connect`](StorageBackend::connect) once at startup.
///
/// # Errors
///
/// Returns a configuration error when the selected backend has no configuration
/// section or its connection coordinates are malformed.
pub fn create_storage_backend(config: &BridgeConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.database_target {
        DatabaseTarget::MongoDB => {
            tracing::info!(database = %config.mongodb.database, "Creating MongoDB backend");
            let backend = MongoBackend::new(config.mongodb.clone());
            Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
        }
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                BridgeError::Configuration(
                    "postgresql configuration is required when database_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL backend");
            let backend = PostgreSQLBackend::new(pg_config.clone())?;
            Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
        }
    }
}
