//! Storage abstraction layer
//!
//! One trait over the document-store (MongoDB) and relational (PostgreSQL) backends,
//! plus the change-feed traits used by the watcher.

pub mod factory;
pub mod traits;

pub use factory::create_storage_backend;
pub use traits::{
    ChangeEvent, ChangeFeed, ChangeFeedSource, ChangeOperation, FeedError, ResumePoint,
    StorageBackend,
};
