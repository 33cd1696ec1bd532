//! Init command implementation
//!
//! Writes a starter configuration file.

use crate::cli::commands::exit;
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "ckg-bridge.toml")]
    pub output: String,

    /// Write every section with comments instead of the short form
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(exit::CONFIG);
        }

        let content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, content) {
            Ok(()) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your topic, subscription and database", self.output);
                println!("  2. Put credentials in .env (CKG_MONGODB_URI or CKG_PG_URL)");
                println!("  3. For PostgreSQL: ckg-bridge migrate");
                println!("  4. ckg-bridge validate-config");
                println!("  5. ckg-bridge consume   and/or   ckg-bridge produce");
                println!();
                Ok(exit::OK)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(exit::FATAL)
            }
        }
    }

    fn generate_minimal_config() -> String {
        r#"# CKG Bridge configuration

environment = "development"        # development | staging | production
database_target = "mongodb"        # mongodb | postgresql

[application]
log_level = "info"

[google]
project_id = "ckg-tb-staging"
auth = "metadata"                  # none | token | metadata

[pubsub]
topic = "projects/ckg-tb-staging/topics/CKG-SITB"
subscription = "projects/ckg-tb-staging/subscriptions/CKG-SITB-sub"

[mongodb]
uri = "${CKG_MONGODB_URI}"
database = "ckgtb"

# [postgresql]
# connection_string = "${CKG_PG_URL}"

[logging]
local_enabled = false
"#
        .to_string()
    }

    fn generate_config_with_examples() -> String {
        r#"# CKG Bridge configuration
#
# Every value below is the default unless noted. `${VAR}` is replaced from the
# environment (and .env); CKG_<SECTION>_<KEY> variables override single keys.

# Value of the `environment` attribute on published messages
environment = "development"        # development | staging | production

# Storage backend
database_target = "mongodb"        # mongodb | postgresql

[application]
log_level = "info"                 # trace | debug | info | warn | error

# ============================================================================
# Google Cloud Pub/Sub
# ============================================================================
[google]
project_id = "ckg-tb-staging"
# Point at the emulator with e.g. "http://localhost:8085/v1"
endpoint = "https://pubsub.googleapis.com/v1"
# none: no Authorization header (emulator)
# token: static bearer token from access_token
# metadata: token from the GCE metadata server
auth = "metadata"
# access_token = "${CKG_GOOGLE_ACCESS_TOKEN}"
timeout_seconds = 60

[google.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[pubsub]
# Short names are expanded against google.project_id
topic = "projects/ckg-tb-staging/topics/CKG-SITB"
subscription = "projects/ckg-tb-staging/subscriptions/CKG-SITB-sub"
message_ordering = false
# ordering_key = "ckg-tb"

# ============================================================================
# Consumer (patient status in)
# ============================================================================
[consumer]
max_messages = 10
sleep_time_secs = 5
# ack_then_record: acknowledge, then record in the inbox (a crash in between
#                  loses the message)
# record_then_ack: record first, acknowledge after the insert
ack_policy = "ack_then_record"
max_in_flight_batches = 4
drain_on_shutdown = true
shutdown_timeout_secs = 30
# inbox_retention_days = 30

# ============================================================================
# Producer (screening results out)
# ============================================================================
[producer]
mode = "auto"                      # auto | poll | watch
batch_size = 100                   # items per published envelope
fetch_limit = 1000                 # records per poll query
lookback_hours = 48                # window start when nothing was exported yet
poll_interval_secs = 60
pause_every_chunks = 10
pause_ms = 1000
timestamp_field = "updated_at"

[producer.attributes]
# source = "ckg"

# ============================================================================
# Storage
# ============================================================================
[mongodb]
uri = "${CKG_MONGODB_URI}"
database = "ckgtb"
min_pool_size = 5
connect_timeout_seconds = 10

# [postgresql]
# connection_string = "${CKG_PG_URL}"
# max_connections = 10
# connection_timeout_seconds = 30
# statement_timeout_seconds = 60
# ssl_mode = "prefer"              # disable | prefer | require

[watcher]
retry_delay_secs = 5

[tables]
screening = "skrining_tb"
patient_status = "pasien_tb"
incoming = "ckg_pubsub_incoming"
outgoing = "ckg_pubsub_outgoing"
region = "master_wilayah"
facility = "master_faskes"
reference_cache = true

[envelope]
marker_field = "transactionSource"
marker_consume = "STATUS-PASIEN-TB"
marker_produce = "SKRINING-CKG-TB"

[logging]
local_enabled = false
local_path = "/var/log/ckg-bridge"
local_rotation = "daily"           # daily | hourly | never
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use tempfile::TempDir;

    #[test]
    fn test_generated_configs_parse() {
        for content in [
            InitArgs::generate_minimal_config(),
            InitArgs::generate_config_with_examples(),
        ] {
            let config: BridgeConfig = toml::from_str(&content).unwrap();
            assert_eq!(config.tables.patient_status, "pasien_tb");
            assert_eq!(config.envelope.marker_consume, "STATUS-PASIEN-TB");
        }
    }

    #[tokio::test]
    async fn test_existing_file_needs_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("ckg-bridge.toml");
        fs::write(&output, "# keep").unwrap();

        let args = InitArgs {
            output: output.to_string_lossy().to_string(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), exit::CONFIG);
        assert_eq!(fs::read_to_string(&output).unwrap(), "# keep");

        let args = InitArgs { force: true, ..args };
        assert_eq!(args.execute().await.unwrap(), exit::OK);
        assert!(fs::read_to_string(&output).unwrap().contains("[pubsub]"));
    }
}
