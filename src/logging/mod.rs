//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Configurable log levels, overridable through `RUST_LOG`
//! - Console output
//! - JSON lines in a rolling local file
//!
//! # Example
//!
//! ```no_run
//! use ckg_bridge::logging::init_logging;
//! use ckg_bridge::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the outcome of one processed receiver batch
///
/// # Example
///
/// ```no_run
/// use ckg_bridge::core::receiver::BatchReport;
/// use ckg_bridge::log_batch_processed;
///
/// let report = BatchReport::default();
/// log_batch_processed!(report);
/// ```
#[macro_export]
macro_rules! log_batch_processed {
    ($report:expr) => {
        tracing::info!(
            messages = $report.len(),
            processed = $report.processed(),
            duplicates = $report.duplicates(),
            skipped = $report.skipped(),
            failed = $report.failed(),
            "Batch processed"
        );
    };
}

/// Log one published envelope
///
/// # Example
///
/// ```no_run
/// use ckg_bridge::log_chunk_published;
///
/// log_chunk_published!("1234567890", 10);
/// ```
#[macro_export]
macro_rules! log_chunk_published {
    ($message_id:expr, $items:expr) => {
        tracing::debug!(
            message_id = %$message_id,
            items = $items,
            "Envelope published"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use ckg_bridge::log_error_with_context;
/// use ckg_bridge::domain::BridgeError;
///
/// let error = BridgeError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::core::receiver::{BatchReport, MessageOutcome};

    #[test]
    fn test_batch_macro_reads_report() {
        let mut report = BatchReport::default();
        report.outcomes.insert("m1".to_string(), MessageOutcome::Duplicate);
        log_batch_processed!(report);
        log_chunk_published!("m2", 3);
        assert_eq!(report.duplicates(), 1);
    }
}
