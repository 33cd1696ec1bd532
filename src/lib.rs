// CKG Bridge - Screening datastore to Pub/Sub bridge
// Copyright (c) 2025 CKG Bridge Contributors
// Licensed under the MIT License

//! # CKG Bridge
//!
//! Moves TB data between the CKG screening datastore and Google Cloud Pub/Sub.
//!
//! ## Overview
//!
//! - **Consume**: pull patient-status envelopes, deduplicate them against an inbox
//!   ledger and upsert the patient statuses
//! - **Produce**: export presumptive TB screening results, either by polling a
//!   watermark window or by following the datastore's change feed, recording every
//!   published message in an outbox ledger
//!
//! The datastore is MongoDB or PostgreSQL behind one [`StorageBackend`] trait and
//! one backend-neutral [`Filter`] grammar.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Receiver, transmitter, change feed watcher, ledgers, transforms
//! - [`adapters`] - MongoDB, PostgreSQL and Pub/Sub integrations
//! - [`domain`] - Filter grammar, records, envelope and domain models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ckg_bridge::adapters::database::create_storage_backend;
//! use ckg_bridge::config::load_config;
//! use ckg_bridge::domain::{Filter, FindOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("ckg-bridge.toml")?;
//!     let storage = create_storage_backend(&config)?;
//!     storage.connect().await?;
//!
//!     let filter = Filter::new().eq("terduga_tb", "Ya");
//!     let rows = storage
//!         .find(&config.tables.screening, &filter, &FindOptions::new().limit(10))
//!         .await?;
//!     println!("{} presumptive cases", rows.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`], whose error is [`domain::BridgeError`].
//! A single-record miss is `BridgeError::NotFound`, checked with
//! [`BridgeError::is_not_found`](domain::BridgeError::is_not_found).
//!
//! [`StorageBackend`]: adapters::database::StorageBackend
//! [`Filter`]: domain::Filter

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
