//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{AckPolicy, AuthMode, BridgeConfig, DatabaseTarget, Environment, ProducerMode};
use super::secret_string;
use crate::domain::errors::BridgeError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`BridgeConfig`]
/// 4. Applies environment variable overrides (`CKG_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`BridgeError::Configuration`] if the file is missing or unreadable, a
/// referenced variable is unset, parsing fails, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use ckg_bridge::config::load_config;
///
/// let config = load_config("ckg-bridge.toml").expect("Failed to load config");
/// println!("{}", config.pubsub.subscription);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(BridgeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        BridgeError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: BridgeConfig = toml::from_str(&contents)
        .map_err(|e| BridgeError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        BridgeError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are copied untouched. Every missing variable is reported in one error.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| BridgeError::Other(format!("invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(BridgeError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_enum<T>(var: &str, val: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(serde_json::Value::String(val.to_lowercase()))
        .map_err(|_| BridgeError::Configuration(format!("Invalid value '{val}' for {var}")))
}

/// Applies environment variable overrides using the `CKG_` prefix
///
/// Variables follow the pattern `CKG_<SECTION>_<KEY>`, for example
/// `CKG_PUBSUB_TOPIC` or `CKG_CONSUMER_MAX_MESSAGES`. Numeric values that fail to
/// parse are ignored; enum values that fail to parse are an error.
fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("CKG_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("CKG_ENVIRONMENT") {
        config.environment = parse_enum::<Environment>("CKG_ENVIRONMENT", &val)?;
    }

    // Google overrides
    if let Ok(val) = std::env::var("CKG_GOOGLE_PROJECT_ID") {
        config.google.project_id = val;
    }
    if let Ok(val) = std::env::var("CKG_GOOGLE_ENDPOINT") {
        config.google.endpoint = val;
    }
    if let Ok(val) = std::env::var("CKG_GOOGLE_AUTH") {
        config.google.auth = parse_enum::<AuthMode>("CKG_GOOGLE_AUTH", &val)?;
    }
    if let Ok(val) = std::env::var("CKG_GOOGLE_ACCESS_TOKEN") {
        config.google.access_token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("CKG_GOOGLE_TIMEOUT_SECONDS") {
        if let Ok(secs) = val.parse() {
            config.google.timeout_seconds = secs;
        }
    }

    // Pub/Sub overrides
    if let Ok(val) = std::env::var("CKG_PUBSUB_TOPIC") {
        config.pubsub.topic = val;
    }
    if let Ok(val) = std::env::var("CKG_PUBSUB_SUBSCRIPTION") {
        config.pubsub.subscription = val;
    }
    if let Ok(val) = std::env::var("CKG_PUBSUB_MESSAGE_ORDERING") {
        config.pubsub.message_ordering = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("CKG_PUBSUB_ORDERING_KEY") {
        config.pubsub.ordering_key = Some(val);
    }

    // Consumer overrides
    if let Ok(val) = std::env::var("CKG_CONSUMER_MAX_MESSAGES") {
        if let Ok(max) = val.parse() {
            config.consumer.max_messages = max;
        }
    }
    if let Ok(val) = std::env::var("CKG_CONSUMER_SLEEP_TIME_SECS") {
        if let Ok(secs) = val.parse() {
            config.consumer.sleep_time_secs = secs;
        }
    }
    if let Ok(val) = std::env::var("CKG_CONSUMER_ACK_POLICY") {
        config.consumer.ack_policy = parse_enum::<AckPolicy>("CKG_CONSUMER_ACK_POLICY", &val)?;
    }
    if let Ok(val) = std::env::var("CKG_CONSUMER_MAX_IN_FLIGHT_BATCHES") {
        if let Ok(n) = val.parse() {
            config.consumer.max_in_flight_batches = n;
        }
    }
    if let Ok(val) = std::env::var("CKG_CONSUMER_DRAIN_ON_SHUTDOWN") {
        config.consumer.drain_on_shutdown = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("CKG_CONSUMER_INBOX_RETENTION_DAYS") {
        if let Ok(days) = val.parse() {
            config.consumer.inbox_retention_days = Some(days);
        }
    }

    // Producer overrides
    if let Ok(val) = std::env::var("CKG_PRODUCER_MODE") {
        config.producer.mode = val.parse::<ProducerMode>().map_err(BridgeError::Configuration)?;
    }
    if let Ok(val) = std::env::var("CKG_PRODUCER_BATCH_SIZE") {
        if let Ok(size) = val.parse() {
            config.producer.batch_size = size;
        }
    }
    if let Ok(val) = std::env::var("CKG_PRODUCER_FETCH_LIMIT") {
        if let Ok(limit) = val.parse() {
            config.producer.fetch_limit = limit;
        }
    }
    if let Ok(val) = std::env::var("CKG_PRODUCER_LOOKBACK_HOURS") {
        if let Ok(hours) = val.parse() {
            config.producer.lookback_hours = hours;
        }
    }
    if let Ok(val) = std::env::var("CKG_PRODUCER_POLL_INTERVAL_SECS") {
        if let Ok(secs) = val.parse() {
            config.producer.poll_interval_secs = secs;
        }
    }

    // Database overrides
    if let Ok(val) = std::env::var("CKG_DATABASE_TARGET") {
        config.database_target = parse_enum::<DatabaseTarget>("CKG_DATABASE_TARGET", &val)?;
    }
    if let Ok(val) = std::env::var("CKG_MONGODB_URI") {
        config.mongodb.uri = secret_string(val);
    }
    if let Ok(val) = std::env::var("CKG_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("CKG_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("CKG_POSTGRESQL_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                pg_config.max_connections = n;
            }
        }
        if let Ok(val) = std::env::var("CKG_POSTGRESQL_SSL_MODE") {
            pg_config.ssl_mode = val;
        }
    }

    // Watcher overrides
    if let Ok(val) = std::env::var("CKG_WATCHER_RETRY_DELAY_SECS") {
        if let Ok(secs) = val.parse() {
            config.watcher.retry_delay_secs = secs;
        }
    }

    // Table overrides
    if let Ok(val) = std::env::var("CKG_TABLES_SCREENING") {
        config.tables.screening = val;
    }
    if let Ok(val) = std::env::var("CKG_TABLES_PATIENT_STATUS") {
        config.tables.patient_status = val;
    }
    if let Ok(val) = std::env::var("CKG_TABLES_INCOMING") {
        config.tables.incoming = val;
    }
    if let Ok(val) = std::env::var("CKG_TABLES_OUTGOING") {
        config.tables.outgoing = val;
    }
    if let Ok(val) = std::env::var("CKG_TABLES_REFERENCE_CACHE") {
        config.tables.reference_cache = val.parse().unwrap_or(true);
    }

    // Envelope overrides
    if let Ok(val) = std::env::var("CKG_ENVELOPE_MARKER_FIELD") {
        config.envelope.marker_field = val;
    }
    if let Ok(val) = std::env::var("CKG_ENVELOPE_MARKER_CONSUME") {
        config.envelope.marker_consume = val;
    }
    if let Ok(val) = std::env::var("CKG_ENVELOPE_MARKER_PRODUCE") {
        config.envelope.marker_produce = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("CKG_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("CKG_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("CKG_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
