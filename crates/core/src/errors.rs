//! Core error types for the TradeOS sync engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.
//! Every error maps to an [`ErrorKind`] so the orchestrator can decide whether a
//! failure is isolated to one record, ends the run, or is worth retrying.

use chrono::ParseError as ChronoParseError;
use serde::Serialize;
use thiserror::Error;
use tradeos_onec::{ErrorKind as ClientErrorKind, OneCError};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected. Fatal for the run, not retried.
    Auth,
    /// Network failure or 5xx that outlived the client's retries.
    Transient,
    /// Malformed or rejected request. Fatal for that call.
    Response,
    /// One record failed to reconcile or persist. The run continues.
    Record,
    /// Anything else that ends a run.
    RunFatal,
}

/// Root error type for the sync engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    OneC(#[from] OneCError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Classifies the error for retry and reporting decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OneC(e) => match e.kind() {
                ClientErrorKind::Auth => ErrorKind::Auth,
                ClientErrorKind::Transient => ErrorKind::Transient,
                ClientErrorKind::Response => ErrorKind::Response,
            },
            Error::Sync(SyncError::Record { .. }) => ErrorKind::Record,
            Error::Validation(_) => ErrorKind::Record,
            _ => ErrorKind::RunFatal,
        }
    }

    /// True when the error means the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::NotFound(_)))
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

/// Errors raised by the orchestrator itself.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Record {external_id} failed: {message}")]
    Record {
        external_id: String,
        message: String,
    },

    #[error("Integration {0} is disabled")]
    IntegrationDisabled(String),

    #[error("Sync task {0} not found")]
    TaskNotFound(String),

    #[error("Sync task {0} has already finished")]
    TaskFinished(String),

    #[error("Pagination exceeded max pages ({0})")]
    TooManyPages(usize),

    #[error("Pagination appears stuck at offset {0}")]
    PaginationStuck(u32),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
