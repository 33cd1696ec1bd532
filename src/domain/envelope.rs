//! Message envelope
//!
//! Every message on the bus is a JSON object of the form
//! `{"<marker_field>": "<marker>", "data": [ {...}, ... ]}`. The marker value is
//! the only discriminator for whether a payload is meant for this side.

use crate::domain::record::Record;
use crate::domain::{BridgeError, Result};
use serde_json::Value;

/// Data key of the envelope
pub const DATA_FIELD: &str = "data";

/// A decoded envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Marker value, when present and a non-empty string
    pub marker: Option<String>,
    /// Object items of the `data` array; non-object items are dropped
    pub data: Vec<Record>,
}

impl Envelope {
    /// Parses a raw payload
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload is not a JSON object.
    pub fn parse(payload: &[u8], marker_field: &str) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(mut object) = value else {
            return Err(BridgeError::Serialization(
                "envelope must be a JSON object".to_string(),
            ));
        };

        let marker = object
            .get(marker_field)
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let data = match object.remove(DATA_FIELD) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self { marker, data })
    }

    /// True when the marker equals the expected value
    pub fn is_marked(&self, expected: &str) -> bool {
        self.marker.as_deref() == Some(expected)
    }

    /// Serializes data items under the given marker
    pub fn encode(marker_field: &str, marker: &str, data: Vec<Value>) -> Result<Vec<u8>> {
        let mut object = serde_json::Map::new();
        object.insert(DATA_FIELD.to_string(), Value::Array(data));
        object.insert(marker_field.to_string(), Value::String(marker.to_string()));
        Ok(serde_json::to_vec(&Value::Object(object))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELD: &str = "transactionSource";

    #[test]
    fn test_parse_marked_envelope() {
        let payload = json!({
            "transactionSource": "STATUS-PASIEN-TB",
            "data": [{"terduga_id": "T-1"}, "ignored", {"terduga_id": "T-2"}]
        });
        let envelope = Envelope::parse(payload.to_string().as_bytes(), FIELD).unwrap();
        assert!(envelope.is_marked("STATUS-PASIEN-TB"));
        assert!(!envelope.is_marked("SKRINING-CKG-TB"));
        assert_eq!(envelope.data.len(), 2);
    }

    #[test]
    fn test_empty_marker_is_unmarked() {
        let payload = json!({"transactionSource": "", "data": []});
        let envelope = Envelope::parse(payload.to_string().as_bytes(), FIELD).unwrap();
        assert_eq!(envelope.marker, None);
    }

    #[test]
    fn test_non_string_marker_is_unmarked() {
        let payload = json!({"transactionSource": 7});
        let envelope = Envelope::parse(payload.to_string().as_bytes(), FIELD).unwrap();
        assert!(!envelope.is_marked("7"));
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_payload() {
        assert!(Envelope::parse(b"not json", FIELD).is_err());
        assert!(Envelope::parse(b"[1,2]", FIELD).is_err());
    }

    #[test]
    fn test_encode_carries_marker() {
        let bytes = Envelope::encode(FIELD, "SKRINING-CKG-TB", vec![json!({"a": 1})]).unwrap();
        let envelope = Envelope::parse(&bytes, FIELD).unwrap();
        assert!(envelope.is_marked("SKRINING-CKG-TB"));
        assert_eq!(envelope.data[0].get("a"), Some(&json!(1)));
    }
}
