//! PostgreSQL relational backend
//!
//! Filters become parameterized WHERE clauses, rows are decoded using a per-table
//! column cache, and the pool comes from deadpool-postgres.

pub mod backend;
pub mod client;
pub mod columns;
pub mod query;

pub use backend::PostgreSQLBackend;
pub use client::PostgreSQLClient;
