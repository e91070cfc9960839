//! SQLite storage for the TradeOS sync engine.
//!
//! Implements the repository traits of `tradeos-core` with Diesel on SQLite:
//! - connection pooling and embedded migrations
//! - a single writer actor that serializes every write transaction
//! - repositories for integrations, the local catalog and sync logs
//!
//! This crate is the only place Diesel appears. `tradeos-core` is
//! database-agnostic and works with the traits alone.

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod catalog;
pub mod integrations;
pub mod sync_logs;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use catalog::CatalogRepository;
pub use integrations::IntegrationRepository;
pub use sync_logs::SyncLogRepository;

// Re-export from tradeos-core for convenience
pub use tradeos_core::errors::{DatabaseError, Error, Result};
