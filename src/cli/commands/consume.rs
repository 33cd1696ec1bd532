//! Consume command implementation
//!
//! Pulls patient-status envelopes from the subscription and upserts them until
//! shutdown.

use crate::cli::commands::{
    bus_client, close_storage, connect_storage, finished, load, require_subscription,
    require_topic,
};
use crate::core::ledger::InboxLedger;
use crate::core::receiver::{Receiver, ReceiverSettings};
use crate::core::transform::PatientStatusHandler;
use chrono::Utc;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the consume command
#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Override messages per pull
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Skip the startup inbox sweep even when a retention is configured
    #[arg(long)]
    pub no_sweep: bool,
}

impl ConsumeArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mut config = match load(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        if let Some(max) = self.max_messages {
            tracing::info!(max_messages = max, "Overriding max_messages from CLI");
            config.consumer.max_messages = max;
        }

        let bus = match bus_client(&config) {
            Ok(bus) => bus,
            Err(code) => return Ok(code),
        };
        if let Err(code) = require_topic(bus.as_ref()).await {
            return Ok(code);
        }
        if let Err(code) = require_subscription(bus.as_ref()).await {
            return Ok(code);
        }

        let storage = match connect_storage(&config).await {
            Ok(storage) => storage,
            Err(code) => return Ok(code),
        };

        let inbox = Arc::new(InboxLedger::new(storage.clone(), &config.tables.incoming));
        if let (Some(days), false) = (config.consumer.inbox_retention_days, self.no_sweep) {
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
            if let Err(e) = inbox.delete_older_than(cutoff).await {
                tracing::warn!(error = %e, "Startup inbox sweep failed");
            }
        }

        let handler = Arc::new(PatientStatusHandler::new(
            storage.clone(),
            &config.tables.patient_status,
            &config.tables.screening,
        ));
        let receiver = Receiver::new(
            bus,
            inbox,
            handler,
            ReceiverSettings::from_config(&config),
        );

        println!(
            "📥 Consuming from {} (Ctrl+C to stop)",
            config.pubsub.subscription
        );
        let stats = receiver.run(shutdown_signal.clone()).await;
        close_storage(storage.as_ref()).await;

        println!(
            "Pulled {} message(s) in {} batch(es); {} pull error(s)",
            stats.messages, stats.batches, stats.pull_errors
        );
        if stats.abandoned_batches > 0 {
            println!(
                "⚠️  {} batch(es) were still running at shutdown",
                stats.abandoned_batches
            );
        }
        Ok(finished(&shutdown_signal))
    }
}
