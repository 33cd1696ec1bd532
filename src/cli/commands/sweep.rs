//! Sweep-inbox command implementation

use crate::cli::commands::{close_storage, connect_storage, exit, load};
use crate::core::ledger::InboxLedger;
use chrono::Utc;
use clap::Args;

/// Arguments for the sweep-inbox command
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Delete entries received more than this many days ago
    /// (defaults to consumer.inbox_retention_days)
    #[arg(long)]
    pub older_than_days: Option<u32>,
}

impl SweepArgs {
    fn retention_days(&self, configured: Option<u32>) -> Option<u32> {
        self.older_than_days.or(configured)
    }

    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };

        let Some(days) = self.retention_days(config.consumer.inbox_retention_days) else {
            eprintln!("❌ No retention given: pass --older-than-days or set consumer.inbox_retention_days");
            return Ok(exit::CONFIG);
        };

        let storage = match connect_storage(&config).await {
            Ok(storage) => storage,
            Err(code) => return Ok(code),
        };

        let inbox = InboxLedger::new(storage.clone(), &config.tables.incoming);
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let code = match inbox.delete_older_than(cutoff).await {
            Ok(deleted) => {
                println!(
                    "🧹 Deleted {deleted} inbox entr{} older than {days} day(s) from {}",
                    if deleted == 1 { "y" } else { "ies" },
                    inbox.table()
                );
                exit::OK
            }
            Err(e) => {
                eprintln!("❌ Inbox sweep failed: {e}");
                exit::FATAL
            }
        };

        close_storage(storage.as_ref()).await;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_configured_retention() {
        let args = SweepArgs {
            older_than_days: Some(7),
        };
        assert_eq!(args.retention_days(Some(30)), Some(7));

        let args = SweepArgs {
            older_than_days: None,
        };
        assert_eq!(args.retention_days(Some(30)), Some(30));
        assert_eq!(args.retention_days(None), None);
    }
}
