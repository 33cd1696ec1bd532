//! Migrate command implementation
//!
//! Applies the bundled relational schema. Only meaningful for PostgreSQL; the
//! document store creates collections on first write.

use crate::adapters::database::StorageBackend;
use crate::adapters::postgresql::PostgreSQLBackend;
use crate::cli::commands::{exit, load};
use crate::config::DatabaseTarget;
use clap::Args;

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {}

impl MigrateArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };

        let pg_config = match (config.database_target, config.postgresql) {
            (DatabaseTarget::PostgreSQL, Some(pg_config)) => pg_config,
            _ => {
                println!("Nothing to migrate: database_target is {}", config.database_target);
                return Ok(exit::OK);
            }
        };

        let backend = match PostgreSQLBackend::new(pg_config) {
            Ok(backend) => backend,
            Err(e) => {
                eprintln!("❌ Invalid PostgreSQL configuration");
                eprintln!("   Error: {e}");
                return Ok(exit::CONFIG);
            }
        };

        println!("🛠  Applying schema to {}", backend.connection_string_safe());
        if let Err(e) = backend.connect().await {
            eprintln!("❌ Failed to connect to PostgreSQL");
            eprintln!("   Error: {e}");
            return Ok(exit::CONNECTION);
        }
        let applied = backend.apply_migrations().await;
        if let Err(e) = backend.close().await {
            tracing::warn!(error = %e, "Failed to close PostgreSQL backend");
        }
        match applied {
            Ok(()) => {
                println!("✅ Schema is up to date");
                Ok(exit::OK)
            }
            Err(e) => {
                tracing::error!(error = %e, "Migration failed");
                eprintln!("❌ Migration failed: {e}");
                Ok(exit::CONNECTION)
            }
        }
    }
}
