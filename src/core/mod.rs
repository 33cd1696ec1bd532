//! Core bridge logic.
//!
//! # Modules
//!
//! - [`ledger`] - Inbox and outbox idempotency ledgers
//! - [`receiver`] - Pull loop, deduplication and the bounded batch pool
//! - [`transmitter`] - Poll and watch exports to the bus
//! - [`watcher`] - Change feed watcher with reconnect handling
//! - [`transform`] - Screening transform and patient-status handler
//! - [`shutdown`] - Cancellation helpers shared by every loop
//!
//! # Example
//!
//! ```rust,no_run
//! use ckg_bridge::adapters::database::create_storage_backend;
//! use ckg_bridge::config::load_config;
//! use ckg_bridge::core::ledger::OutboxLedger;
//! use ckg_bridge::core::transform::{ReferenceResolver, ScreeningTransform};
//! use ckg_bridge::core::transmitter::{Transmitter, TransmitterSettings};
//! use ckg_bridge::adapters::pubsub::PubSubClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ckg-bridge.toml")?;
//! let storage = create_storage_backend(&config)?;
//! storage.connect().await?;
//!
//! let bus = Arc::new(PubSubClient::new(&config.google, &config.pubsub)?);
//! let outbox = Arc::new(OutboxLedger::new(storage.clone(), &config.tables.outgoing));
//! let resolver = Arc::new(ReferenceResolver::new(
//!     storage.clone(),
//!     &config.tables.region,
//!     &config.tables.facility,
//!     config.tables.reference_cache,
//! ));
//! let transform = Arc::new(ScreeningTransform::new(resolver));
//!
//! let transmitter = Transmitter::new(
//!     storage,
//!     bus,
//!     outbox,
//!     transform,
//!     TransmitterSettings::from_config(&config),
//! );
//!
//! let (_shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
//! let summary = transmitter.export_once(&mut shutdown_rx).await?;
//! println!("Published: {}", summary.published);
//! # Ok(())
//! # }
//! ```

pub mod ledger;
pub mod receiver;
pub mod shutdown;
pub mod transform;
pub mod transmitter;
pub mod watcher;
