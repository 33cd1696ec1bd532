//! External system integrations
//!
//! - [`database`] - storage trait, change-feed traits and the backend factory
//! - [`mongodb`] - document-store backend with change streams
//! - [`postgresql`] - relational backend
//! - [`pubsub`] - Google Cloud Pub/Sub REST client
//!
//! Driver and HTTP types stay inside these modules; everything above them works
//! with [`crate::domain`] types only.

pub mod database;
pub mod mongodb;
pub mod postgresql;
pub mod pubsub;
