//! Status command implementation
//!
//! Shows the export watermark and the inbox backlog.

use crate::cli::commands::{close_storage, connect_storage, exit, load};
use crate::core::ledger::OutboxLedger;
use crate::domain::{Filter, FindOptions};
use clap::Args;
use serde_json::Value;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also count inbox entries that were never marked processed
    #[arg(long)]
    pub pending: bool,
}

impl StatusArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking bridge status");

        println!("📊 Bridge Status");
        println!();

        let config = match load(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        let storage = match connect_storage(&config).await {
            Ok(storage) => storage,
            Err(code) => return Ok(code),
        };

        let outbox = OutboxLedger::new(storage.clone(), &config.tables.outgoing);
        let watermark = match outbox.last_export_watermark().await {
            Ok(watermark) => watermark,
            Err(e) => {
                println!("❌ Failed to read the outbox");
                println!("   Error: {e}");
                close_storage(storage.as_ref()).await;
                return Ok(exit::FATAL);
            }
        };

        println!("  Database: {}", config.database_target);
        println!(
            "  Change feed: {}",
            if storage.change_feed_source().is_some() {
                "available"
            } else {
                "not available (poll only)"
            }
        );
        match watermark {
            Some(ts) => println!("  Last export: {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
            None => {
                println!("  Last export: never");
                println!(
                    "  Next poll starts {}h back",
                    config.producer.lookback_hours
                );
            }
        }

        if self.pending {
            let filter = Filter::new().eq("processed_at", Value::Null);
            let options = FindOptions::new().columns(["id"]);
            match storage.find(&config.tables.incoming, &filter, &options).await {
                Ok(rows) => println!("  Unprocessed inbox entries: {}", rows.len()),
                Err(e) => println!("  Unprocessed inbox entries: unavailable ({e})"),
            }
        }

        println!();
        close_storage(storage.as_ref()).await;
        Ok(exit::OK)
    }
}
