//! Producer side: export screening records to the bus
//!
//! Two modes, chosen once at startup:
//!
//! - **poll**: every `poll_interval_secs`, export the records whose timestamp falls
//!   in `[watermark, now)`, where the watermark is the newest outbox entry or
//!   `now - lookback_hours` when the outbox is empty
//! - **watch**: follow the source table's change feed and publish every in-scope
//!   insert, update or replace as a single-item envelope
//!
//! `auto` picks watch when the backend has a change feed.

pub mod summary;

pub use summary::ExportSummary;

use crate::adapters::database::{ChangeEvent, ChangeFeedSource, StorageBackend};
use crate::adapters::pubsub::{MessageBus, OutgoingMessage};
use crate::config::{BridgeConfig, ProducerMode};
use crate::core::ledger::OutboxLedger;
use crate::core::shutdown::{is_shutdown, sleep_or_shutdown};
use crate::core::transform::OutboundTransform;
use crate::core::watcher::ChangeFeedWatcher;
use crate::domain::record::format_timestamp;
use crate::domain::{BridgeError, Envelope, Filter, FindOptions, OutboxEntry, Result, Sort};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Transmitter tuning, taken from `[producer]`, `[pubsub]`, `[envelope]` and `[watcher]`
#[derive(Debug, Clone)]
pub struct TransmitterSettings {
    pub source_table: String,
    pub timestamp_field: String,
    pub batch_size: usize,
    pub fetch_limit: usize,
    pub lookback: chrono::Duration,
    pub poll_interval: Duration,
    pub pause_every_chunks: usize,
    pub pause: Duration,
    pub environment: String,
    pub attributes: BTreeMap<String, String>,
    pub ordering_key: Option<String>,
    pub marker_field: String,
    pub marker_produce: String,
    pub watch_retry_delay: Duration,
}

impl TransmitterSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let producer = &config.producer;
        let ordering_key = config
            .pubsub
            .ordering_key
            .clone()
            .filter(|_| config.pubsub.message_ordering);
        Self {
            source_table: config.tables.screening.clone(),
            timestamp_field: producer.timestamp_field.clone(),
            batch_size: producer.batch_size,
            fetch_limit: producer.fetch_limit,
            lookback: chrono::Duration::hours(producer.lookback_hours),
            poll_interval: Duration::from_secs(producer.poll_interval_secs),
            pause_every_chunks: producer.pause_every_chunks,
            pause: Duration::from_millis(producer.pause_ms),
            environment: config.environment.as_str().to_string(),
            attributes: producer.attributes.clone(),
            ordering_key,
            marker_field: config.envelope.marker_field.clone(),
            marker_produce: config.envelope.marker_produce.clone(),
            watch_retry_delay: Duration::from_secs(config.watcher.retry_delay_secs),
        }
    }
}

/// Fate of one change event in watch mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Published(String),
    /// Unsupported operation or out of scope
    Discarded(String),
    Failed(String),
}

pub struct Transmitter {
    storage: Arc<dyn StorageBackend>,
    bus: Arc<dyn MessageBus>,
    outbox: Arc<OutboxLedger>,
    transform: Arc<dyn OutboundTransform>,
    settings: TransmitterSettings,
}

impl Transmitter {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        bus: Arc<dyn MessageBus>,
        outbox: Arc<OutboxLedger>,
        transform: Arc<dyn OutboundTransform>,
        settings: TransmitterSettings,
    ) -> Self {
        Self {
            storage,
            bus,
            outbox,
            transform,
            settings,
        }
    }

    pub fn settings(&self) -> &TransmitterSettings {
        &self.settings
    }

    /// Mode actually used for `requested`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when watch is requested on a backend without a
    /// change feed.
    pub fn resolve_mode(&self, requested: ProducerMode) -> Result<ProducerMode> {
        let has_feed = self.storage.change_feed_source().is_some();
        match requested {
            ProducerMode::Auto if has_feed => Ok(ProducerMode::Watch),
            ProducerMode::Auto => Ok(ProducerMode::Poll),
            ProducerMode::Watch if !has_feed => Err(BridgeError::Configuration(format!(
                "{} backend has no change feed; use producer.mode = \"poll\"",
                self.storage.kind()
            ))),
            mode => Ok(mode),
        }
    }

    /// Runs in `mode` until shutdown
    pub async fn run(&self, mode: ProducerMode, shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.resolve_mode(mode)? {
            ProducerMode::Watch => {
                let source = self.storage.change_feed_source().ok_or_else(|| {
                    BridgeError::Configuration("change feed unavailable".to_string())
                })?;
                self.run_watch(source, shutdown).await;
                Ok(())
            }
            _ => {
                self.run_poll(shutdown).await;
                Ok(())
            }
        }
    }

    /// Exports every `poll_interval` until shutdown
    pub async fn run_poll(&self, mut shutdown: watch::Receiver<bool>) -> ExportSummary {
        tracing::info!(
            table = %self.settings.source_table,
            interval_secs = self.settings.poll_interval.as_secs(),
            "Transmitter started in poll mode"
        );
        let mut total = ExportSummary::default();
        loop {
            if is_shutdown(&shutdown) {
                break;
            }
            match self.export_once(&mut shutdown).await {
                Ok(summary) => {
                    summary.log_summary();
                    total.absorb(&summary);
                }
                Err(e) => tracing::error!(error = %e, "Export failed"),
            }
            if sleep_or_shutdown(&mut shutdown, self.settings.poll_interval).await {
                break;
            }
        }
        tracing::info!(published = total.published, "Transmitter stopped");
        total
    }

    /// Export window ending at `now`
    pub async fn export_window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = match self.outbox.last_export_watermark().await? {
            Some(watermark) => watermark,
            None => {
                tracing::info!(
                    lookback_hours = self.settings.lookback.num_hours(),
                    "No previous export, using default lookback"
                );
                now - self.settings.lookback
            }
        };
        Ok((start, now))
    }

    async fn pending_records(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<crate::domain::Record>> {
        let field = self.settings.timestamp_field.as_str();
        let filter = Filter::new()
            .gte(field, format_timestamp(&start))
            .lt(field, format_timestamp(&end));
        let options = FindOptions::new()
            .sort(Sort::new().asc(field))
            .limit(self.settings.fetch_limit as u64);
        self.storage
            .find(&self.settings.source_table, &filter, &options)
            .await
    }

    /// One poll export
    ///
    /// Shutdown is honoured between chunks; the summary then covers what was
    /// published so far.
    pub async fn export_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<ExportSummary> {
        let started = Instant::now();
        let (start, end) = self.export_window(Utc::now()).await?;
        let mut summary = ExportSummary::new(start, end);

        let records = self.pending_records(start, end).await?;
        summary.records_found = records.len();
        tracing::debug!(records = records.len(), "Pending records fetched");

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match self.transform.transform(record).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(error = %e, "Transform failed");
                }
            }
        }

        let chunk_size = self.settings.batch_size.max(1);
        for (index, chunk) in items.chunks(chunk_size).enumerate() {
            if is_shutdown(shutdown) {
                tracing::info!(chunk = index, "Shutdown requested, export interrupted");
                break;
            }

            match self.publish_items(chunk.to_vec(), None).await {
                Ok(message_id) => {
                    summary.chunks += 1;
                    summary.published += chunk.len();
                    crate::log_chunk_published!(message_id, chunk.len());
                }
                Err(e) => {
                    summary.failed += chunk.len();
                    tracing::error!(chunk = index, items = chunk.len(), error = %e, "Publish failed");
                }
            }

            let every = self.settings.pause_every_chunks;
            if every > 0 && (index + 1) % every == 0 {
                summary.pauses += 1;
                tracing::debug!(pause_ms = self.settings.pause.as_millis() as u64, "Rate-limit pause");
                if sleep_or_shutdown(shutdown, self.settings.pause).await {
                    break;
                }
            }
        }

        Ok(summary.with_duration(started.elapsed()))
    }

    fn attributes(&self, operation: Option<&str>) -> BTreeMap<String, String> {
        let mut attributes = self.settings.attributes.clone();
        attributes.insert("environment".to_string(), self.settings.environment.clone());
        attributes.insert("timestamp".to_string(), Utc::now().to_rfc3339());
        if let Some(operation) = operation {
            attributes.insert("operation_type".to_string(), operation.to_string());
        }
        attributes
    }

    /// Publishes one envelope and records it in the outbox
    async fn publish_items(&self, items: Vec<Value>, operation: Option<&str>) -> Result<String> {
        let payload = Envelope::encode(
            &self.settings.marker_field,
            &self.settings.marker_produce,
            items,
        )?;
        let message = OutgoingMessage::new(payload)
            .with_attributes(self.attributes(operation))
            .with_ordering_key(self.settings.ordering_key.clone());
        let message_id = self.bus.publish(message).await?;

        if let Err(e) = self
            .outbox
            .record_published(&OutboxEntry::new(message_id.clone(), Utc::now()))
            .await
        {
            tracing::warn!(message_id = %message_id, error = %e, "Outbox write failed after publish");
        }
        Ok(message_id)
    }

    /// Publishes one change event when it is in scope
    pub async fn handle_change(&self, event: ChangeEvent) -> ChangeOutcome {
        if !event.operation.carries_document() {
            tracing::info!(operation = %event.operation, "Unsupported change operation, discarded");
            return ChangeOutcome::Discarded(format!("unsupported operation {}", event.operation));
        }
        let Some(document) = event.full_document else {
            tracing::debug!(operation = %event.operation, "Change without document, discarded");
            return ChangeOutcome::Discarded("no document".to_string());
        };

        let item = match self.transform.transform(document).await {
            Ok(Some(item)) => item,
            Ok(None) => return ChangeOutcome::Discarded("out of scope".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Transform failed for change event");
                return ChangeOutcome::Failed(e.to_string());
            }
        };

        let operation = event.operation.to_string();
        match self.publish_items(vec![item], Some(&operation)).await {
            Ok(message_id) => {
                crate::log_chunk_published!(message_id, 1);
                ChangeOutcome::Published(message_id)
            }
            Err(e) => {
                tracing::error!(operation = %operation, error = %e, "Publish failed for change event");
                ChangeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Follows the source table's change feed until shutdown
    pub async fn run_watch(&self, source: Arc<dyn ChangeFeedSource>, shutdown: watch::Receiver<bool>) {
        tracing::info!(table = %self.settings.source_table, "Transmitter started in watch mode");
        let mut watcher = ChangeFeedWatcher::new(
            source,
            self.settings.source_table.clone(),
            self.settings.watch_retry_delay,
            shutdown,
        );
        watcher
            .run(|event| async move {
                self.handle_change(event).await;
            })
            .await;
        let stats = watcher.metrics().snapshot();
        tracing::info!(
            events = stats.events,
            reconnects = stats.feeds_opened.saturating_sub(1),
            "Transmitter stopped"
        );
    }
}
