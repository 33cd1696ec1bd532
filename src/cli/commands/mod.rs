//! CLI command implementations
//!
//! Every command returns the process exit code. The helpers here print the
//! failure and hand back the matching code so commands can bail out early.

pub mod consume;
pub mod init;
pub mod migrate;
pub mod produce;
pub mod status;
pub mod sweep;
pub mod validate;

use crate::adapters::database::{create_storage_backend, StorageBackend};
use crate::adapters::pubsub::{MessageBus, PubSubClient};
use crate::config::{load_config, BridgeConfig};
use std::sync::Arc;
use tokio::sync::watch;

/// Exit codes
pub mod exit {
    pub const OK: i32 = 0;
    pub const CONFIG: i32 = 2;
    pub const CONNECTION: i32 = 4;
    pub const FATAL: i32 = 5;
    pub const INTERRUPTED: i32 = 130;
}

pub(crate) fn load(config_path: &str) -> Result<BridgeConfig, i32> {
    load_config(config_path).map_err(|e| {
        tracing::error!(config_path, error = %e, "Failed to load configuration");
        eprintln!("❌ Failed to load configuration file");
        eprintln!("   Error: {e}");
        exit::CONFIG
    })
}

/// Creates and connects the configured backend
pub(crate) async fn connect_storage(config: &BridgeConfig) -> Result<Arc<dyn StorageBackend>, i32> {
    let storage = create_storage_backend(config).map_err(|e| {
        eprintln!("❌ Invalid database configuration");
        eprintln!("   Error: {e}");
        exit::CONFIG
    })?;
    storage.connect().await.map_err(|e| {
        tracing::error!(target_db = %config.database_target, error = %e, "Storage unreachable");
        eprintln!("❌ Failed to connect to {}", config.database_target);
        eprintln!("   Error: {e}");
        exit::CONNECTION
    })?;
    Ok(storage)
}

pub(crate) fn bus_client(config: &BridgeConfig) -> Result<Arc<PubSubClient>, i32> {
    PubSubClient::new(&config.google, &config.pubsub)
        .map(Arc::new)
        .map_err(|e| {
            eprintln!("❌ Invalid Pub/Sub configuration");
            eprintln!("   Error: {e}");
            exit::CONFIG
        })
}

/// Verifies the topic exists; a missing topic is not retried
pub(crate) async fn require_topic(bus: &dyn MessageBus) -> Result<(), i32> {
    bus.ensure_topic().await.map_err(|e| {
        tracing::error!(topic = %bus.topic(), error = %e, "Topic check failed");
        eprintln!("❌ Topic check failed: {e}");
        exit::CONNECTION
    })
}

/// Verifies the subscription exists; a missing subscription is not retried
pub(crate) async fn require_subscription(bus: &dyn MessageBus) -> Result<(), i32> {
    bus.ensure_subscription().await.map_err(|e| {
        tracing::error!(subscription = %bus.subscription(), error = %e, "Subscription check failed");
        eprintln!("❌ Subscription check failed: {e}");
        exit::CONNECTION
    })
}

/// Exit code for a loop that returned, depending on whether it was interrupted
pub(crate) fn finished(shutdown: &watch::Receiver<bool>) -> i32 {
    if *shutdown.borrow() {
        exit::INTERRUPTED
    } else {
        exit::OK
    }
}

pub(crate) async fn close_storage(storage: &dyn StorageBackend) {
    if let Err(e) = storage.close().await {
        tracing::warn!(error = %e, "Failed to close storage backend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_reports_interruption() {
        let (tx, rx) = watch::channel(false);
        assert_eq!(finished(&rx), exit::OK);
        tx.send(true).unwrap();
        assert_eq!(finished(&rx), exit::INTERRUPTED);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        assert_eq!(load("/nonexistent/ckg-bridge.toml").unwrap_err(), exit::CONFIG);
    }
}
