//! Storage abstraction traits
//!
//! Every component that reads or writes tables goes through [`StorageBackend`]. The
//! two implementations translate the shared [`Filter`] grammar into their native query
//! form; callers never see driver types.

use crate::config::DatabaseTarget;
use crate::domain::{Filter, FindOptions, Record, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Capability set shared by the document-store and relational backends
///
/// A backend owns exactly one live connection handle. It is created once by
/// [`connect`](StorageBackend::connect) and shared by every caller; a call made
/// before `connect` or after [`close`](StorageBackend::close) fails with
/// `BridgeError::Connection`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> DatabaseTarget;

    /// Opens the connection; repeated calls reuse the first handle
    async fn connect(&self) -> Result<()>;

    /// Liveness probe, independent of the CRUD path
    async fn ping(&self) -> Result<()>;

    /// Releases the connection handle
    async fn close(&self) -> Result<()>;

    async fn find(&self, table: &str, filter: &Filter, options: &FindOptions)
        -> Result<Vec<Record>>;

    /// First matching record; fails with `BridgeError::NotFound` when none matches
    ///
    /// `options.limit` and `options.skip` are ignored.
    async fn find_one(&self, table: &str, filter: &Filter, options: &FindOptions)
        -> Result<Record>;

    /// Inserts one record and returns the assigned id
    async fn insert_one(&self, table: &str, record: Record) -> Result<String>;

    /// Sets the given fields on the first matching record; returns the matched count
    async fn update_one(&self, table: &str, filter: &Filter, fields: Record) -> Result<u64>;

    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<u64>;

    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// Change notifications, when the backend has them
    fn change_feed_source(&self) -> Option<Arc<dyn ChangeFeedSource>> {
        None
    }
}

/// Kind of mutation reported by a change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Other(String),
}

impl ChangeOperation {
    pub fn from_name(name: &str) -> Self {
        match name {
            "insert" => ChangeOperation::Insert,
            "update" => ChangeOperation::Update,
            "replace" => ChangeOperation::Replace,
            other => ChangeOperation::Other(other.to_string()),
        }
    }

    /// True for operations that carry a full document
    pub fn carries_document(&self) -> bool {
        !matches!(self, ChangeOperation::Other(_))
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Insert => write!(f, "insert"),
            ChangeOperation::Update => write!(f, "update"),
            ChangeOperation::Replace => write!(f, "replace"),
            ChangeOperation::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A normalized change notification; consumed once, never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    /// Opaque id of the changed record
    pub document_key: Value,
    /// Present for insert, update and replace
    pub full_document: Option<Record>,
}

/// Opaque position in a change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint(pub Value);

/// Error surfaced by an open feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The client lost its connection; probe before reopening
    Disconnected(String),
    /// Any other failure; reopen directly
    Other(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Disconnected(msg) => write!(f, "client disconnected: {msg}"),
            FeedError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Opens change feeds on one backend
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
    /// Opens a feed on `table` with full-document lookup
    ///
    /// `resume` continues after the given point; `None` starts at "now".
    async fn open_feed(
        &self,
        table: &str,
        resume: Option<ResumePoint>,
    ) -> std::result::Result<Box<dyn ChangeFeed>, FeedError>;

    /// Health probe used while disconnected
    async fn ping(&self) -> std::result::Result<(), FeedError>;
}

/// One live change-feed handle
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next event, `Ok(None)` when nothing arrived during the poll window
    async fn next_event(&mut self) -> std::result::Result<Option<ChangeEvent>, FeedError>;

    /// Position after the last event returned
    fn resume_token(&self) -> Option<ResumePoint>;

    /// Releases the handle
    async fn close(self: Box<Self>);
}
