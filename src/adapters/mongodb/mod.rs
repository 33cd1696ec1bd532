//! MongoDB document-store backend
//!
//! Filters are translated 1:1 into native query documents, updates use `$set`, and
//! change notifications come from collection change streams with full-document lookup.

pub mod backend;
pub mod change_stream;
pub mod query;

pub use backend::MongoBackend;
pub use change_stream::{MongoChangeFeed, MongoFeedSource};
