//! Idempotency ledgers
//!
//! The inbox records inbound message ids so redelivered messages are skipped; the
//! outbox records published message ids and yields the export watermark. Both
//! borrow the shared storage backend and never open a connection of their own.

pub mod inbox;
pub mod outbox;

pub use inbox::InboxLedger;
pub use outbox::OutboxLedger;

use crate::adapters::database::StorageBackend;
use crate::domain::record::non_empty_str;
use crate::domain::{Filter, FindOptions};
use std::collections::HashSet;

/// Ids from `ids` already present in `table`
///
/// A failed lookup is logged and reported as "nothing known" so that messages are
/// reprocessed rather than silently dropped.
pub(crate) async fn known_ids(
    storage: &dyn StorageBackend,
    table: &str,
    ids: &[String],
) -> HashSet<String> {
    if ids.is_empty() {
        return HashSet::new();
    }

    let filter = Filter::new().is_in("id", ids.to_vec());
    let options = FindOptions::new().columns(["id"]);
    match storage.find(table, &filter, &options).await {
        Ok(records) => records
            .iter()
            .filter_map(|record| non_empty_str(record, "id").map(str::to_string))
            .collect(),
        Err(e) => {
            tracing::warn!(table, error = %e, "Ledger lookup failed, treating all ids as new");
            HashSet::new()
        }
    }
}
