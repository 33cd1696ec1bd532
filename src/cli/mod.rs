//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for the bridge using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// CKG Bridge - TB screening datastore to Pub/Sub bridge
#[derive(Parser, Debug)]
#[command(name = "ckg-bridge")]
#[command(version, about, long_about = None)]
#[command(author = "CKG Bridge Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ckg-bridge.toml", env = "CKG_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error); defaults to application.log_level
    #[arg(short, long, env = "CKG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull patient-status messages and upsert them
    Consume(commands::consume::ConsumeArgs),

    /// Export screening results to the topic
    Produce(commands::produce::ProduceArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show the export watermark and inbox backlog
    Status(commands::status::StatusArgs),

    /// Delete old inbox ledger entries
    SweepInbox(commands::sweep::SweepArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),

    /// Create the PostgreSQL tables
    Migrate(commands::migrate::MigrateArgs),
}

impl Commands {
    /// True for commands that run until interrupted
    pub fn is_long_running(&self) -> bool {
        match self {
            Commands::Consume(_) => true,
            Commands::Produce(args) => !args.once,
            _ => false,
        }
    }
}
