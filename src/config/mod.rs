//! Configuration management for the bridge.
//!
//! TOML configuration with:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CKG_<SECTION>_<KEY>` environment overrides
//! - Defaults for every setting
//! - Validation of the active database section only
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//! database_target = "postgresql"
//!
//! [google]
//! project_id = "ckg-tb-prod"
//! auth = "metadata"
//!
//! [pubsub]
//! topic = "projects/ckg-tb-prod/topics/CKG-SITB"
//! subscription = "projects/ckg-tb-prod/subscriptions/CKG-SITB-sub"
//!
//! [postgresql]
//! connection_string = "${CKG_PG_URL}"
//!
//! [consumer]
//! ack_policy = "record_then_ack"
//! ```
//!
//! ```rust,no_run
//! use ckg_bridge::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ckg-bridge.toml")?;
//! println!("Database: {}", config.database_target);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    AckPolicy, ApplicationConfig, AuthMode, BridgeConfig, ConsumerConfig, DatabaseTarget,
    EnvelopeConfig, Environment, GoogleConfig, LoggingConfig, MongoDbConfig, PostgreSQLConfig,
    ProducerConfig, ProducerMode, PubSubConfig, RetryConfig, TablesConfig, WatcherConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
