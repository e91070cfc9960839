//! Helpers shared by the repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::StorageError;

/// Largest `IN (...)` list sent in one statement. SQLite builds may cap
/// bound parameters at 999.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Splits a slice into chunks that fit one `IN (...)` clause.
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

/// Timestamps are stored as fixed-width RFC 3339 text so that string order
/// is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp '{}': {}", value, e)))
}

pub fn parse_opt_ts(value: Option<&str>) -> Result<Option<DateTime<Utc>>, StorageError> {
    value.map(parse_ts).transpose()
}

pub fn parse_decimal(value: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(value)
        .map_err(|e| StorageError::SerializationError(format!("bad decimal '{}': {}", value, e)))
}

pub fn parse_opt_decimal(value: Option<&str>) -> Result<Option<Decimal>, StorageError> {
    value.map(parse_decimal).transpose()
}
