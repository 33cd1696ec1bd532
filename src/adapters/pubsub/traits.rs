//! Message bus trait
//!
//! The receiver and transmitter only see [`MessageBus`]; the REST client is one
//! implementation and tests supply in-memory ones.

use crate::adapters::pubsub::models::{OutgoingMessage, ReceivedMessage};
use crate::domain::{MessageBusError, Result};
use async_trait::async_trait;

/// Publish, pull and administrative calls against one topic and one subscription
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fully qualified topic name
    fn topic(&self) -> &str;

    /// Fully qualified subscription name
    fn subscription(&self) -> &str;

    async fn topic_exists(&self) -> Result<bool>;

    async fn subscription_exists(&self) -> Result<bool>;

    /// Publishes one message and returns the bus-assigned id
    async fn publish(&self, message: OutgoingMessage) -> Result<String>;

    /// Pulls at most `max_messages`; an empty batch is not an error
    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>>;

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()>;

    /// Fails with `TopicNotFound` when the topic is missing
    async fn ensure_topic(&self) -> Result<()> {
        if self.topic_exists().await? {
            Ok(())
        } else {
            Err(MessageBusError::TopicNotFound(self.topic().to_string()).into())
        }
    }

    /// Fails with `SubscriptionNotFound` when the subscription is missing
    async fn ensure_subscription(&self) -> Result<()> {
        if self.subscription_exists().await? {
            Ok(())
        } else {
            Err(MessageBusError::SubscriptionNotFound(self.subscription().to_string()).into())
        }
    }
}
