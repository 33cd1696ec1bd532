//! Pub/Sub REST v1 request and response bodies
//!
//! Domain-facing messages carry raw bytes; the wire structs carry base64 text.

use crate::domain::{MessageBusError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message to publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub ordering_key: Option<String>,
}

impl OutgoingMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_ordering_key(mut self, key: Option<String>) -> Self {
        self.ordering_key = key;
        self
    }
}

/// A pulled message awaiting acknowledgement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: Option<String>,
}

impl ReceivedMessage {
    /// Payload as text, replacing invalid UTF-8
    pub fn data_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub message_id: String,
    #[serde(default, skip_serializing)]
    pub publish_time: Option<String>,
}

impl From<OutgoingMessage> for WireMessage {
    fn from(message: OutgoingMessage) -> Self {
        Self {
            data: general_purpose::STANDARD.encode(&message.data),
            attributes: message.attributes,
            ordering_key: message.ordering_key,
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublishRequest {
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    #[serde(default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub max_messages: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    #[serde(default)]
    pub received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReceivedMessage {
    pub ack_id: String,
    pub message: WireMessage,
}

impl WireReceivedMessage {
    pub fn into_message(self) -> Result<ReceivedMessage> {
        let data = general_purpose::STANDARD
            .decode(self.message.data.as_bytes())
            .map_err(|e| {
                MessageBusError::InvalidResponse(format!(
                    "message {} has invalid base64 data: {e}",
                    self.message.message_id
                ))
            })?;
        Ok(ReceivedMessage {
            ack_id: self.ack_id,
            message_id: self.message.message_id,
            data,
            attributes: self.message.attributes,
            publish_time: self.message.publish_time,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest<'a> {
    pub ack_ids: &'a [String],
}

/// Token issued by the metadata server
#[derive(Debug, Deserialize)]
pub struct MetadataToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outgoing_message_wire_shape() {
        let mut attributes = BTreeMap::new();
        attributes.insert("environment".to_string(), "staging".to_string());
        let wire = WireMessage::from(OutgoingMessage::new("{}").with_attributes(attributes));
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(
            value,
            json!({"data": "e30=", "attributes": {"environment": "staging"}})
        );
    }

    #[test]
    fn test_pull_response_decodes_base64() {
        let body = json!({
            "receivedMessages": [{
                "ackId": "ack-1",
                "message": {"data": "aGVsbG8=", "messageId": "m1", "publishTime": "2025-01-01T00:00:00Z"}
            }]
        });
        let response: PullResponse = serde_json::from_value(body).unwrap();
        let message = response
            .received_messages
            .into_iter()
            .next()
            .unwrap()
            .into_message()
            .unwrap();
        assert_eq!(message.message_id, "m1");
        assert_eq!(message.data_text(), "hello");
    }

    #[test]
    fn test_empty_pull_response() {
        let response: PullResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.received_messages.is_empty());
    }
}
