//! Domain models and types for the bridge.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Filter grammar** ([`Filter`], [`Sort`], [`FindOptions`]) shared by both storage backends
//! - **Records** ([`Record`]) and static column descriptors ([`RecordDescriptor`])
//! - **Ledger entries** ([`InboxEntry`], [`OutboxEntry`])
//! - **Envelope** ([`Envelope`]) with the marker-field discriminator
//! - **Clinical models** for screening results and TB patient status
//! - **Error types** ([`BridgeError`], [`StorageError`], [`MessageBusError`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, BridgeError>`]:
//!
//! ```rust,no_run
//! use ckg_bridge::domain::Result;
//!
//! fn example() -> Result<()> {
//!     let config = ckg_bridge::config::load_config("ckg-bridge.toml")?;
//!     println!("{}", config.pubsub.topic);
//!     Ok(())
//! }
//! ```

pub mod envelope;
pub mod errors;
pub mod filter;
pub mod ledger;
pub mod patient_status;
pub mod record;
pub mod result;
pub mod schema;
pub mod screening;

// Re-export commonly used types for convenience
pub use envelope::Envelope;
pub use errors::{BridgeError, MessageBusError, StorageError};
pub use filter::{Clause, Comparison, Filter, FindOptions, Operator, Sort, SortOrder};
pub use ledger::{InboxEntry, OutboxEntry};
pub use patient_status::{PatientStatus, StatusOutcome};
pub use record::Record;
pub use result::Result;
pub use schema::{Persisted, RecordDescriptor};
pub use screening::{ScreeningRaw, ScreeningResult};
