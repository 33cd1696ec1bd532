//! Produce command implementation
//!
//! Exports presumptive TB screening results to the topic, by polling or by
//! following the change feed.

use crate::cli::commands::{
    bus_client, close_storage, connect_storage, exit, finished, load, require_topic,
};
use crate::config::ProducerMode;
use crate::core::ledger::OutboxLedger;
use crate::core::transform::{ReferenceResolver, ScreeningTransform};
use crate::core::transmitter::{Transmitter, TransmitterSettings};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the produce command
#[derive(Args, Debug)]
pub struct ProduceArgs {
    /// Override the producer mode (auto, poll or watch)
    #[arg(long)]
    pub mode: Option<ProducerMode>,

    /// Run a single poll export and exit
    #[arg(long)]
    pub once: bool,
}

impl ProduceArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        let mode = self.mode.unwrap_or(config.producer.mode);

        let bus = match bus_client(&config) {
            Ok(bus) => bus,
            Err(code) => return Ok(code),
        };
        if let Err(code) = require_topic(bus.as_ref()).await {
            return Ok(code);
        }

        let storage = match connect_storage(&config).await {
            Ok(storage) => storage,
            Err(code) => return Ok(code),
        };

        let resolver = Arc::new(ReferenceResolver::new(
            storage.clone(),
            &config.tables.region,
            &config.tables.facility,
            config.tables.reference_cache,
        ));
        let transmitter = Transmitter::new(
            storage.clone(),
            bus,
            Arc::new(OutboxLedger::new(storage.clone(), &config.tables.outgoing)),
            Arc::new(ScreeningTransform::new(resolver)),
            TransmitterSettings::from_config(&config),
        );

        let code = if self.once {
            let mut shutdown = shutdown_signal.clone();
            match transmitter.export_once(&mut shutdown).await {
                Ok(summary) => {
                    summary.log_summary();
                    println!("📤 Export complete");
                    println!("   Records found: {}", summary.records_found);
                    println!("   Published:     {} in {} envelope(s)", summary.published, summary.chunks);
                    println!("   Skipped:       {}", summary.skipped);
                    println!("   Failed:        {}", summary.failed);
                    if summary.is_successful() {
                        finished(&shutdown_signal)
                    } else {
                        exit::FATAL
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Export failed");
                    eprintln!("❌ Export failed: {e}");
                    exit::FATAL
                }
            }
        } else {
            println!("📤 Producing to {} in {mode:?} mode (Ctrl+C to stop)", config.pubsub.topic);
            match transmitter.run(mode, shutdown_signal.clone()).await {
                Ok(()) => finished(&shutdown_signal),
                Err(e) => {
                    eprintln!("❌ {e}");
                    exit::CONFIG
                }
            }
        };

        close_storage(storage.as_ref()).await;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_mode_flag_parses() {
        let cli = Cli::parse_from(["ckg-bridge", "produce", "--mode", "poll", "--once"]);
        match cli.command {
            Commands::Produce(args) => {
                assert_eq!(args.mode, Some(ProducerMode::Poll));
                assert!(args.once);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert!(Cli::try_parse_from(["ckg-bridge", "produce", "--mode", "stream"]).is_err());
    }
}
