//! Domain error types
//!
//! This module defines the error hierarchy for the bridge.
//! Driver and HTTP client errors are flattened into strings with context so that
//! no third-party type crosses the domain boundary.

use thiserror::Error;

/// Main bridge error type
///
/// This is the primary error type used throughout the application.
/// It wraps the storage and message bus error families and provides context
/// for error handling.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Message bus errors
    #[error("Message bus error: {0}")]
    MessageBus(#[from] MessageBusError),

    /// No live connection, or the connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single-record lookup matched nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Returns true when the error signals a single-record miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}

/// Storage backend errors
///
/// Raised by both storage variants. The table and operation are always carried
/// so a failure can be diagnosed from the log line alone.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A query or command failed in the driver
    #[error("{operation} on '{table}' failed: {message}")]
    QueryFailed {
        table: String,
        operation: String,
        message: String,
    },

    /// The filter tree is malformed (empty `or`/`and`, unknown identifiers)
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A referenced column does not exist in the introspected table
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A stored value could not be decoded into a record
    #[error("Failed to decode row from '{table}': {message}")]
    Decode { table: String, message: String },

    /// The change feed could not be opened or read
    #[error("Change feed error on '{table}': {message}")]
    ChangeFeed { table: String, message: String },

    /// The backend has no change feed
    #[error("Change feeds are not supported by the {0} backend")]
    ChangeFeedUnsupported(String),
}

impl StorageError {
    /// Shorthand for a driver failure with table and operation context
    pub fn query(
        table: impl Into<String>,
        operation: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        StorageError::QueryFailed {
            table: table.into(),
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Message bus errors
#[derive(Debug, Error)]
pub enum MessageBusError {
    /// Failed to reach the bus endpoint
    #[error("Failed to connect to message bus: {0}")]
    ConnectionFailed(String),

    /// Token acquisition or authorization failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The configured topic does not exist
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The configured subscription does not exist
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Publish was rejected
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Pull was rejected
    #[error("Pull failed: {0}")]
    PullFailed(String),

    /// Acknowledge was rejected
    #[error("Acknowledge failed: {0}")]
    AcknowledgeFailed(String),

    /// Server returned a non-success status
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_storage_error_conversion() {
        let storage_err = StorageError::query("pasien_tb", "find", "timeout");
        let err: BridgeError = storage_err.into();
        assert!(matches!(err, BridgeError::Storage(_)));
        assert_eq!(
            err.to_string(),
            "Storage error: find on 'pasien_tb' failed: timeout"
        );
    }

    #[test]
    fn test_message_bus_error_conversion() {
        let bus_err = MessageBusError::TopicNotFound("CKG-SITB".to_string());
        let err: BridgeError = bus_err.into();
        assert!(matches!(err, BridgeError::MessageBus(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(BridgeError::NotFound("x".to_string()).is_not_found());
        assert!(!BridgeError::Validation("x".to_string()).is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: BridgeError = toml_err.into();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_bridge_error_implements_std_error() {
        let err = BridgeError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
