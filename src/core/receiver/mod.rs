//! Consumer side: pull, deduplicate, handle
//!
//! One pull loop hands every non-empty batch to a [`BatchPool`] and keeps pulling.
//! For each message of a batch:
//!
//! 1. acknowledge (or, with [`AckPolicy::RecordThenAck`], defer until the inbox insert)
//! 2. skip ids already in the inbox ledger
//! 3. parse the envelope and check the consume marker
//! 4. record the id in the inbox ledger
//! 5. run the inbound handler
//! 6. mark the inbox entry processed
//!
//! A failing message never stops the rest of its batch.
//!
//! With the default [`AckPolicy::AckThenRecord`] a crash between acknowledge and
//! the inbox insert loses that message: the bus will not redeliver it.

pub mod pool;

pub use pool::BatchPool;

use crate::adapters::pubsub::{MessageBus, ReceivedMessage};
use crate::config::{AckPolicy, BridgeConfig};
use crate::core::ledger::InboxLedger;
use crate::core::shutdown::{is_shutdown, sleep_or_shutdown, wait_for_shutdown};
use crate::core::transform::InboundHandler;
use crate::domain::record::parse_timestamp;
use crate::domain::{Envelope, InboxEntry, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Receiver tuning, taken from `[consumer]` and `[envelope]`
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub max_messages: u32,
    pub sleep_time: Duration,
    pub ack_policy: AckPolicy,
    pub max_in_flight_batches: usize,
    pub drain_on_shutdown: bool,
    pub shutdown_timeout: Duration,
    pub marker_field: String,
    pub marker_consume: String,
}

impl ReceiverSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let consumer = &config.consumer;
        Self {
            max_messages: u32::try_from(consumer.max_messages).unwrap_or(u32::MAX),
            sleep_time: Duration::from_secs(consumer.sleep_time_secs),
            ack_policy: consumer.ack_policy,
            max_in_flight_batches: consumer.max_in_flight_batches,
            drain_on_shutdown: consumer.drain_on_shutdown,
            shutdown_timeout: Duration::from_secs(consumer.shutdown_timeout_secs),
            marker_field: config.envelope.marker_field.clone(),
            marker_consume: config.envelope.marker_consume.clone(),
        }
    }
}

/// What happened to one pulled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Handled; item counts as reported by the handler
    Processed { accepted: usize, rejected: usize },
    /// Already in the inbox ledger
    Duplicate,
    /// Malformed or not addressed to this consumer
    Skipped(String),
    /// Inbox insert or handler failed
    Failed(String),
}

impl MessageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, MessageOutcome::Failed(_))
    }
}

/// Outcomes of one batch, keyed by message id
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: BTreeMap<String, MessageOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| predicate(o)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Processed { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Duplicate))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(MessageOutcome::is_failure)
    }
}

/// Totals over the life of one [`Receiver::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub pulls: u64,
    pub batches: u64,
    pub messages: u64,
    pub pull_errors: u64,
    /// Batches still running when the loop returned
    pub abandoned_batches: usize,
}

#[derive(Clone)]
pub struct Receiver {
    bus: Arc<dyn MessageBus>,
    inbox: Arc<InboxLedger>,
    handler: Arc<dyn InboundHandler>,
    settings: ReceiverSettings,
}

impl Receiver {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        inbox: Arc<InboxLedger>,
        handler: Arc<dyn InboundHandler>,
        settings: ReceiverSettings,
    ) -> Self {
        Self {
            bus,
            inbox,
            handler,
            settings,
        }
    }

    pub fn settings(&self) -> &ReceiverSettings {
        &self.settings
    }

    /// Pulls until shutdown, then drains or detaches in-flight batches
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ReceiverStats {
        let mut stats = ReceiverStats::default();
        let mut pool = BatchPool::new(self.settings.max_in_flight_batches);

        tracing::info!(
            subscription = %self.bus.subscription(),
            ack_policy = ?self.settings.ack_policy,
            max_in_flight = pool.capacity(),
            "Receiver started"
        );

        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            let pulled = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                pulled = self.bus.pull(self.settings.max_messages) => pulled,
            };
            stats.pulls += 1;

            let messages = match pulled {
                Ok(messages) => messages,
                Err(e) => {
                    stats.pull_errors += 1;
                    tracing::warn!(error = %e, "Pull failed");
                    if sleep_or_shutdown(&mut shutdown, self.settings.sleep_time).await {
                        break;
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                if sleep_or_shutdown(&mut shutdown, self.settings.sleep_time).await {
                    break;
                }
                continue;
            }

            stats.batches += 1;
            stats.messages += messages.len() as u64;

            let receiver = self.clone();
            let spawned = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => None,
                spawned = pool.spawn(async move {
                    let report = receiver.process_batch(messages).await;
                    crate::log_batch_processed!(report);
                }) => Some(spawned),
            };
            match spawned {
                None => break,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Could not schedule batch");
                    break;
                }
                Some(Ok(())) => {}
            }
        }

        stats.abandoned_batches = if self.settings.drain_on_shutdown {
            tracing::info!(in_flight = pool.in_flight(), "Draining in-flight batches");
            pool.drain(self.settings.shutdown_timeout).await
        } else {
            pool.detach()
        };
        tracing::info!(
            pulls = stats.pulls,
            batches = stats.batches,
            messages = stats.messages,
            "Receiver stopped"
        );
        stats
    }

    /// Processes one pulled batch, message by message
    pub async fn process_batch(&self, messages: Vec<ReceivedMessage>) -> BatchReport {
        let ids: Vec<String> = messages.iter().map(|m| m.message_id.clone()).collect();
        let mut known = self.inbox.existing_ids(&ids).await;

        let mut report = BatchReport::default();
        for message in messages {
            let id = message.message_id.clone();
            let outcome = self.process_message(message, &mut known).await;
            match &outcome {
                MessageOutcome::Failed(reason) => {
                    tracing::warn!(message_id = %id, reason = %reason, "Message failed");
                }
                MessageOutcome::Skipped(reason) => {
                    tracing::info!(message_id = %id, reason = %reason, "Message skipped");
                }
                MessageOutcome::Duplicate => {
                    tracing::debug!(message_id = %id, "Duplicate message skipped");
                }
                MessageOutcome::Processed { .. } => {}
            }
            report.outcomes.insert(id, outcome);
        }
        report
    }

    async fn acknowledge(&self, message: &ReceivedMessage) {
        if let Err(e) = self
            .bus
            .acknowledge(std::slice::from_ref(&message.ack_id))
            .await
        {
            tracing::warn!(message_id = %message.message_id, error = %e, "Acknowledge failed");
        }
    }

    async fn process_message(
        &self,
        message: ReceivedMessage,
        known: &mut HashSet<String>,
    ) -> MessageOutcome {
        let record_first = self.settings.ack_policy == AckPolicy::RecordThenAck;
        if !record_first {
            self.acknowledge(&message).await;
        }

        if known.contains(&message.message_id) {
            if record_first {
                self.acknowledge(&message).await;
            }
            return MessageOutcome::Duplicate;
        }

        let envelope = match Envelope::parse(&message.data, &self.settings.marker_field) {
            Ok(envelope) => envelope,
            Err(e) => {
                if record_first {
                    self.acknowledge(&message).await;
                }
                return MessageOutcome::Skipped(format!("malformed payload: {e}"));
            }
        };
        if !envelope.is_marked(&self.settings.marker_consume) {
            if record_first {
                self.acknowledge(&message).await;
            }
            return MessageOutcome::Skipped(format!(
                "{} is not {}",
                self.settings.marker_field, self.settings.marker_consume
            ));
        }

        let entry = InboxEntry::new(
            message.message_id.clone(),
            message.data_text(),
            received_at(&message),
        );
        if let Err(e) = self.inbox.record_new(&entry).await {
            if record_first {
                // Left unacknowledged, so the bus redelivers it
                return MessageOutcome::Failed(format!("inbox insert failed: {e}"));
            }
            // Already acknowledged: processing is the only chance left
            tracing::error!(message_id = %message.message_id, error = %e, "Inbox insert failed");
        }
        known.insert(message.message_id.clone());
        if record_first {
            self.acknowledge(&message).await;
        }

        match self.handle(&message.message_id, envelope).await {
            Ok(outcome) => outcome,
            Err(e) => MessageOutcome::Failed(e.to_string()),
        }
    }

    async fn handle(&self, message_id: &str, envelope: Envelope) -> Result<MessageOutcome> {
        let report = self.handler.handle(envelope.data).await?;
        self.inbox.mark_processed(message_id, Utc::now()).await?;
        tracing::debug!(
            message_id,
            accepted = report.accepted,
            rejected = report.rejected,
            "Message processed"
        );
        Ok(MessageOutcome::Processed {
            accepted: report.accepted,
            rejected: report.rejected,
        })
    }
}

/// Bus publish time of a message, falling back to the local clock
fn received_at(message: &ReceivedMessage) -> DateTime<Utc> {
    message
        .publish_time
        .as_deref()
        .and_then(|raw| parse_timestamp(raw).ok())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_received_at_prefers_publish_time() {
        let message = ReceivedMessage {
            publish_time: Some("2025-03-04T05:06:07.123456Z".to_string()),
            ..ReceivedMessage::default()
        };
        assert_eq!(
            received_at(&message).timestamp(),
            Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap().timestamp()
        );
    }

    #[test]
    fn test_received_at_falls_back_to_now() {
        let before = Utc::now();
        for publish_time in [None, Some("yesterday".to_string())] {
            let message = ReceivedMessage {
                publish_time,
                ..ReceivedMessage::default()
            };
            assert!(received_at(&message) >= before);
        }
    }
}
