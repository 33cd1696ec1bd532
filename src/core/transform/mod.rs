//! Domain transforms
//!
//! The orchestrators only know two seams:
//!
//! - [`InboundHandler`]: validates and persists the items of one consumed envelope
//! - [`OutboundTransform`]: turns one source record into a publishable item, or
//!   reports it as out of scope
//!
//! The screening transform and the patient-status handler are the production
//! implementations.

pub mod patient_status;
pub mod region;
pub mod screening;

pub use patient_status::PatientStatusHandler;
pub use region::ReferenceResolver;
pub use screening::ScreeningTransform;

use crate::domain::{Record, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Per-envelope result of an inbound handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerReport {
    /// Items written
    pub accepted: usize,
    /// Items rejected by validation or by a failed write
    pub rejected: usize,
}

impl HandlerReport {
    pub fn total(&self) -> usize {
        self.accepted + self.rejected
    }
}

#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Processes every item of one envelope
    ///
    /// Item failures are counted in the report. An `Err` means the envelope as a
    /// whole could not be handled and must not be marked processed.
    async fn handle(&self, items: Vec<Record>) -> Result<HandlerReport>;
}

#[async_trait]
pub trait OutboundTransform: Send + Sync {
    /// `Ok(None)` when the record is not in scope for export
    async fn transform(&self, record: Record) -> Result<Option<Value>>;
}
