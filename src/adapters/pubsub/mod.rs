//! Google Cloud Pub/Sub message bus
//!
//! [`MessageBus`] is the seam used by the receiver and transmitter;
//! [`PubSubClient`] implements it over the REST v1 API.

pub mod client;
pub mod models;
pub mod traits;

pub use client::{resource_path, PubSubClient};
pub use models::{OutgoingMessage, ReceivedMessage};
pub use traits::MessageBus;
