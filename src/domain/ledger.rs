//! Inbox and outbox ledger entries

use crate::domain::record::{format_timestamp, parse_timestamp};
use crate::domain::schema::{Persisted, RecordDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One inbound message id seen by the receiver
///
/// `processed_at` stays null until the domain write for the message succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    /// Raw payload as received
    pub data: String,
    #[serde(with = "timestamp")]
    pub received_at: DateTime<Utc>,
    #[serde(with = "timestamp::option", default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl InboxEntry {
    pub fn new(id: impl Into<String>, data: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            received_at,
            processed_at: None,
        }
    }
}

impl Persisted for InboxEntry {
    const DESCRIPTOR: RecordDescriptor = RecordDescriptor {
        name: "inbox_entry",
        key: "id",
        columns: &["id", "data", "received_at", "processed_at"],
    };
}

/// One outbound message published by the transmitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::option", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            updated_at: None,
        }
    }
}

impl Persisted for OutboxEntry {
    const DESCRIPTOR: RecordDescriptor = RecordDescriptor {
        name: "outbox_entry",
        key: "id",
        columns: &["id", "created_at", "updated_at"],
    };
}

/// Serde helpers storing timestamps as fixed-width RFC3339 strings
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.is_empty() => parse_timestamp(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
